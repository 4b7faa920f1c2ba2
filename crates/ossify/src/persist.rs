//! # Persistence
//!
//! Saves the [`EntityTable`] to a versioned record stream and restores it,
//! re-resolving entity handles and pruning stale data on the way in.
//!
//! ## Stream Layout
//!
//! A stream is a sequence of records. All integers are little-endian.
//!
//! ```text
//! record     := tag[4] version:u32 length:u32 body[length]
//!
//! ACTM body  := handle:u64 slot_count:u8 slot*
//! slot       := gender:u8 viewpoint:u8 node_count:u32 node*
//! node       := name:str override_count:u32 override*
//! override   := name:str value_count:u32 value*
//! value      := key:u16 index:i8 payload
//! payload    := 0 f32 | 1 i32 | 2 u8 | 3 str | 4 u64
//! str        := len:u32 utf8[len]
//! ```
//!
//! One `ACTM` record per entity. Empty slots are not written.
//!
//! ## Load
//!
//! ```text
//! per record:
//!   tag != ACTM            → error, abort (earlier entries stay applied)
//!   version too new        → error, abort
//!   read handle + slots
//!   empty tree             → discard
//!   resolve handle         → discard if gone
//!   remap resource payloads
//!   insert into table
//!   prune content-sourced overrides whose content isn't loaded
//!   strip the session-only override name
//!   schedule recompute (queue, else inline if a scene was given)
//! ```

use crate::engine::{RecomputeOptions, TransformEngine};
use crate::entity::{EntityHandle, EntityResolver, Gender, Viewpoint};
use crate::error::PersistError;
use crate::registry::{EntitySlots, NodeRegistry, OverrideRegistration, OverrideSet};
use crate::scene::SceneGraph;
use crate::table::EntityTable;
use crate::value::{OverrideKey, OverridePayload, OverrideValue};

/// Tag of a per-entity record.
pub const ENTITY_RECORD: [u8; 4] = *b"ACTM";
/// Newest record version this build reads and the one it writes.
pub const SERIALIZATION_VERSION: u32 = 2;

const RECORD_HEADER_LEN: usize = 12;
/// Longest node name, override name or string payload a record can hold.
/// Saving a longer one fails; reading a longer length prefix means corruption.
const MAX_STRING_LEN: usize = 1 << 16;

const PAYLOAD_FLOAT: u8 = 0;
const PAYLOAD_INT: u8 = 1;
const PAYLOAD_BOOL: u8 = 2;
const PAYLOAD_STRING: u8 = 3;
const PAYLOAD_RESOURCE: u8 = 4;

// ── Store traits ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordHeader {
    pub tag: [u8; 4],
    pub version: u32,
    pub length: u32,
}

/// Writing half of the persistent store.
pub trait RecordWrite {
    /// Close any open record and start a new one.
    fn open_record(&mut self, tag: [u8; 4], version: u32) -> Result<(), PersistError>;

    /// Append to the open record.
    fn write_bytes(&mut self, data: &[u8]) -> Result<(), PersistError>;
}

/// Reading half of the persistent store.
pub trait RecordRead {
    /// Skip whatever is left of the current record and read the next
    /// header. `None` at end of stream.
    fn next_record(&mut self) -> Result<Option<RecordHeader>, PersistError>;

    /// Fill `buf` from the current record.
    fn read_bytes(&mut self, buf: &mut [u8]) -> Result<(), PersistError>;

    /// Map a handle saved in an earlier session to its current value, or
    /// `None` if the entity no longer exists.
    fn resolve_handle(&self, old: u64) -> Option<u64>;
}

// ── In-memory store ──────────────────────────────────────────────────────

/// Builds a record stream in memory.
#[derive(Debug, Default)]
pub struct RecordWriter {
    buf: Vec<u8>,
    open: Option<usize>,
}

impl RecordWriter {
    pub fn new() -> Self {
        Self::default()
    }

    fn close(&mut self) {
        if let Some(start) = self.open.take() {
            let length = (self.buf.len() - start - RECORD_HEADER_LEN) as u32;
            self.buf[start + 8..start + RECORD_HEADER_LEN].copy_from_slice(&length.to_le_bytes());
        }
    }

    /// Close the last record and return the stream bytes.
    pub fn finish(mut self) -> Vec<u8> {
        self.close();
        self.buf
    }
}

impl RecordWrite for RecordWriter {
    fn open_record(&mut self, tag: [u8; 4], version: u32) -> Result<(), PersistError> {
        self.close();
        self.open = Some(self.buf.len());
        self.buf.extend_from_slice(&tag);
        self.buf.extend_from_slice(&version.to_le_bytes());
        self.buf.extend_from_slice(&0u32.to_le_bytes());
        Ok(())
    }

    fn write_bytes(&mut self, data: &[u8]) -> Result<(), PersistError> {
        if self.open.is_none() {
            return Err(PersistError::NoOpenRecord);
        }
        self.buf.extend_from_slice(data);
        Ok(())
    }
}

/// Reads a record stream from a byte slice.
pub struct RecordReader<'a> {
    data: &'a [u8],
    pos: usize,
    record_end: usize,
    resolver: Box<dyn Fn(u64) -> Option<u64> + 'a>,
}

impl<'a> RecordReader<'a> {
    /// A reader whose handles all resolve to themselves.
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            pos: 0,
            record_end: 0,
            resolver: Box::new(Some::<u64>),
        }
    }

    pub fn with_resolver(mut self, resolver: impl Fn(u64) -> Option<u64> + 'a) -> Self {
        self.resolver = Box::new(resolver);
        self
    }
}

impl RecordRead for RecordReader<'_> {
    fn next_record(&mut self) -> Result<Option<RecordHeader>, PersistError> {
        self.pos = self.record_end;
        let remaining = &self.data[self.pos..];
        if remaining.is_empty() {
            return Ok(None);
        }
        if remaining.len() < RECORD_HEADER_LEN {
            return Err(PersistError::Truncated("record header"));
        }
        let mut tag = [0u8; 4];
        tag.copy_from_slice(&remaining[0..4]);
        let version = u32::from_le_bytes([remaining[4], remaining[5], remaining[6], remaining[7]]);
        let length = u32::from_le_bytes([remaining[8], remaining[9], remaining[10], remaining[11]]);

        let start = self.pos + RECORD_HEADER_LEN;
        let end = start
            .checked_add(length as usize)
            .filter(|&end| end <= self.data.len())
            .ok_or(PersistError::Truncated("record body"))?;
        self.pos = start;
        self.record_end = end;
        Ok(Some(RecordHeader { tag, version, length }))
    }

    fn read_bytes(&mut self, buf: &mut [u8]) -> Result<(), PersistError> {
        let end = self.pos + buf.len();
        if end > self.record_end {
            return Err(PersistError::Truncated("record data"));
        }
        buf.copy_from_slice(&self.data[self.pos..end]);
        self.pos = end;
        Ok(())
    }

    fn resolve_handle(&self, old: u64) -> Option<u64> {
        (self.resolver)(old)
    }
}

// ── Primitives ───────────────────────────────────────────────────────────

fn read_array<const N: usize>(r: &mut dyn RecordRead, what: &'static str) -> Result<[u8; N], PersistError> {
    let mut buf = [0u8; N];
    r.read_bytes(&mut buf).map_err(|e| match e {
        PersistError::Truncated(_) => PersistError::Truncated(what),
        other => other,
    })?;
    Ok(buf)
}

fn read_u8(r: &mut dyn RecordRead, what: &'static str) -> Result<u8, PersistError> {
    Ok(read_array::<1>(r, what)?[0])
}

fn read_u16(r: &mut dyn RecordRead, what: &'static str) -> Result<u16, PersistError> {
    Ok(u16::from_le_bytes(read_array(r, what)?))
}

fn read_u32(r: &mut dyn RecordRead, what: &'static str) -> Result<u32, PersistError> {
    Ok(u32::from_le_bytes(read_array(r, what)?))
}

fn read_u64(r: &mut dyn RecordRead, what: &'static str) -> Result<u64, PersistError> {
    Ok(u64::from_le_bytes(read_array(r, what)?))
}

fn read_string(r: &mut dyn RecordRead, what: &'static str) -> Result<String, PersistError> {
    let len = read_u32(r, what)? as usize;
    check_string_len(len)?;
    let mut buf = vec![0u8; len];
    r.read_bytes(&mut buf).map_err(|_| PersistError::Truncated(what))?;
    Ok(String::from_utf8(buf)?)
}

fn write_string(w: &mut dyn RecordWrite, s: &str) -> Result<(), PersistError> {
    check_string_len(s.len())?;
    w.write_bytes(&(s.len() as u32).to_le_bytes())?;
    w.write_bytes(s.as_bytes())
}

fn check_string_len(len: usize) -> Result<(), PersistError> {
    if len > MAX_STRING_LEN {
        return Err(PersistError::StringTooLong {
            len,
            max: MAX_STRING_LEN,
        });
    }
    Ok(())
}

fn write_count(w: &mut dyn RecordWrite, count: usize) -> Result<(), PersistError> {
    w.write_bytes(&(count as u32).to_le_bytes())
}

// ── Save ─────────────────────────────────────────────────────────────────

/// Write one `ACTM` record per entity. Returns the number written.
pub fn save_table(table: &EntityTable, writer: &mut dyn RecordWrite) -> Result<usize, PersistError> {
    let entries = table.snapshot();
    for (handle, slots) in &entries {
        writer.open_record(ENTITY_RECORD, SERIALIZATION_VERSION)?;
        write_entity(writer, *handle, slots)?;
    }
    log::debug!("Saved node transforms for {} entities", entries.len());
    Ok(entries.len())
}

fn write_entity(w: &mut dyn RecordWrite, handle: EntityHandle, slots: &EntitySlots) -> Result<(), PersistError> {
    w.write_bytes(&handle.0.to_le_bytes())?;

    let populated: Vec<_> = slots.iter().filter(|(_, _, registry)| !registry.is_empty()).collect();
    w.write_bytes(&[populated.len() as u8])?;
    for (gender, viewpoint, registry) in populated {
        w.write_bytes(&[gender.index() as u8, viewpoint.index() as u8])?;
        write_registry(w, registry)?;
    }
    Ok(())
}

fn write_registry(w: &mut dyn RecordWrite, registry: &NodeRegistry) -> Result<(), PersistError> {
    write_count(w, registry.len())?;
    for (node, registration) in registry.iter() {
        write_string(w, node)?;
        write_count(w, registration.len())?;
        for (name, set) in registration.iter() {
            write_string(w, name)?;
            write_count(w, set.len())?;
            for value in set.iter() {
                write_value(w, value)?;
            }
        }
    }
    Ok(())
}

fn write_value(w: &mut dyn RecordWrite, value: &OverrideValue) -> Result<(), PersistError> {
    w.write_bytes(&value.key.code().to_le_bytes())?;
    w.write_bytes(&value.index.to_le_bytes())?;
    match &value.payload {
        OverridePayload::Float(f) => {
            w.write_bytes(&[PAYLOAD_FLOAT])?;
            w.write_bytes(&f.to_le_bytes())
        }
        OverridePayload::Int(i) => {
            w.write_bytes(&[PAYLOAD_INT])?;
            w.write_bytes(&i.to_le_bytes())
        }
        OverridePayload::Bool(b) => w.write_bytes(&[PAYLOAD_BOOL, u8::from(*b)]),
        OverridePayload::String(s) => {
            w.write_bytes(&[PAYLOAD_STRING])?;
            write_string(w, s)
        }
        OverridePayload::Resource(handle) => {
            w.write_bytes(&[PAYLOAD_RESOURCE])?;
            w.write_bytes(&handle.to_le_bytes())
        }
    }
}

// ── Load ─────────────────────────────────────────────────────────────────

/// Outcome of a load pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadReport {
    /// Entities present in the table after cleanup, in stream order.
    pub restored: Vec<EntityHandle>,
    /// Entries dropped because their tree was empty, their handle no longer
    /// resolved, or cleanup left nothing behind.
    pub discarded: usize,
    /// Override sets removed by post-load cleanup.
    pub pruned: usize,
}

fn tag_name(tag: [u8; 4]) -> String {
    String::from_utf8_lossy(&tag).into_owned()
}

fn read_gender(code: u8) -> Result<Gender, PersistError> {
    Gender::ALL
        .into_iter()
        .find(|g| g.index() == code as usize)
        .ok_or(PersistError::InvalidSlot(code))
}

fn read_viewpoint(code: u8) -> Result<Viewpoint, PersistError> {
    Viewpoint::ALL
        .into_iter()
        .find(|v| v.index() == code as usize)
        .ok_or(PersistError::InvalidSlot(code))
}

fn read_value(r: &mut dyn RecordRead) -> Result<OverrideValue, PersistError> {
    let code = read_u16(r, "value key")?;
    let key = OverrideKey::from_code(code).ok_or(PersistError::UnknownKey(code))?;
    let index = i8::from_le_bytes(read_array(r, "value index")?);
    let payload = match read_u8(r, "payload type")? {
        PAYLOAD_FLOAT => OverridePayload::Float(f32::from_le_bytes(read_array(r, "float payload")?)),
        PAYLOAD_INT => OverridePayload::Int(i32::from_le_bytes(read_array(r, "int payload")?)),
        PAYLOAD_BOOL => OverridePayload::Bool(read_u8(r, "bool payload")? != 0),
        PAYLOAD_STRING => OverridePayload::String(read_string(r, "string payload")?),
        PAYLOAD_RESOURCE => OverridePayload::Resource(read_u64(r, "resource payload")?),
        other => return Err(PersistError::UnknownPayload(other)),
    };
    Ok(OverrideValue::new(key, index, payload))
}

fn read_registry(r: &mut dyn RecordRead, registry: &mut NodeRegistry) -> Result<(), PersistError> {
    let nodes = read_u32(r, "node count")?;
    for _ in 0..nodes {
        let node = read_string(r, "node name")?;
        let mut registration = OverrideRegistration::new();
        let overrides = read_u32(r, "override count")?;
        for _ in 0..overrides {
            let name = read_string(r, "override name")?;
            let values = read_u32(r, "value count")?;
            let set = registration.entry(&name);
            for _ in 0..values {
                set.insert(read_value(r)?);
            }
        }
        registry.insert(node.into(), registration);
    }
    Ok(())
}

fn read_entity(r: &mut dyn RecordRead) -> Result<(EntityHandle, EntitySlots), PersistError> {
    let handle = EntityHandle(read_u64(r, "entity handle")?);
    let mut slots = EntitySlots::new();
    let count = read_u8(r, "slot count")?;
    for _ in 0..count {
        let gender = read_gender(read_u8(r, "gender")?)?;
        let viewpoint = read_viewpoint(read_u8(r, "viewpoint")?)?;
        read_registry(r, slots.slot_mut(gender, viewpoint))?;
    }
    Ok((handle, slots))
}

/// Map a saved handle to a live one. Static handles must still exist as-is;
/// the rest go through the store's resolution.
fn resolve_entity(
    old: EntityHandle,
    reader: &dyn RecordRead,
    entities: &dyn EntityResolver,
) -> Option<EntityHandle> {
    let handle = if old.is_static() {
        old
    } else {
        EntityHandle(reader.resolve_handle(old.0)?)
    };
    entities.is_alive(handle).then_some(handle)
}

/// Re-resolve resource payloads. Values whose entity is gone are dropped.
fn remap_resources(slots: &mut EntitySlots, reader: &dyn RecordRead) {
    slots.for_each_slot_mut(|_, _, registry| {
        for (_, registration) in registry.iter_mut() {
            registration.retain(|_, set| {
                *set = set
                    .iter()
                    .filter_map(|value| match value.payload {
                        OverridePayload::Resource(old) => reader.resolve_handle(old).map(|new| {
                            OverrideValue::new(value.key, value.index, OverridePayload::Resource(new))
                        }),
                        _ => Some(value.clone()),
                    })
                    .collect::<OverrideSet>();
                true
            });
        }
    });
}

/// Restore one entity record into the table. Returns the live handle if the
/// entity still has overrides afterwards.
fn load_entry(
    engine: &TransformEngine,
    reader: &mut dyn RecordRead,
    entities: &dyn EntityResolver,
    report: &mut LoadReport,
) -> Result<Option<EntityHandle>, PersistError> {
    let (old, mut slots) = read_entity(reader)?;
    if slots.is_empty() {
        log::debug!("Discarding {old}: no overrides saved");
        report.discarded += 1;
        return Ok(None);
    }
    let Some(handle) = resolve_entity(old, &*reader, entities) else {
        log::debug!("Discarding {old}: entity no longer exists");
        report.discarded += 1;
        return Ok(None);
    };

    remap_resources(&mut slots, &*reader);

    let table = engine.table();
    let config = engine.config();
    table.insert_entity(handle, slots);
    report.pruned += table.remove_where(handle, |name| {
        config.is_content_name(name) && !entities.is_content_loaded(name)
    });
    report.pruned += table.remove_named_across_entity(handle, &config.session_override_name);

    if !table.contains(handle) {
        log::debug!("Discarding {handle}: nothing left after cleanup");
        report.discarded += 1;
        return Ok(None);
    }
    report.restored.push(handle);
    Ok(Some(handle))
}

/// Read every record from `reader` into `engine`'s table.
///
/// Each restored entity gets a recompute: queued if the engine has a task
/// queue, otherwise run now against `scene` when one is given. On error the
/// entries restored so far stay in the table.
pub fn load_table(
    engine: &TransformEngine,
    reader: &mut dyn RecordRead,
    entities: &dyn EntityResolver,
    mut scene: Option<&mut dyn SceneGraph>,
) -> Result<LoadReport, PersistError> {
    let mut report = LoadReport::default();

    while let Some(header) = reader.next_record()? {
        if header.tag != ENTITY_RECORD {
            log::error!("Unexpected record '{}' in node transform data", tag_name(header.tag));
            return Err(PersistError::UnexpectedRecord {
                tag: tag_name(header.tag),
                expected: "ACTM",
            });
        }
        if header.version > SERIALIZATION_VERSION {
            return Err(PersistError::UnsupportedVersion {
                found: header.version,
                supported: SERIALIZATION_VERSION,
            });
        }

        let Some(handle) = load_entry(engine, reader, entities, &mut report)? else {
            continue;
        };
        if engine.schedule_recompute(handle) {
            continue;
        }
        match scene.as_deref_mut() {
            Some(scene) => {
                let options = RecomputeOptions {
                    immediate: true,
                    reset: false,
                };
                engine.set_handle_node_transforms(handle, scene, entities, options);
            }
            None => log::debug!("No task queue or scene; {handle} updates on next recompute"),
        }
    }

    log::info!(
        "Loaded node transforms: {} restored, {} discarded, {} pruned",
        report.restored.len(),
        report.discarded,
        report.pruned
    );
    Ok(report)
}

impl TransformEngine {
    /// See [`save_table`].
    pub fn save(&self, writer: &mut dyn RecordWrite) -> Result<usize, PersistError> {
        save_table(self.table(), writer)
    }

    /// See [`load_table`].
    pub fn load(
        &self,
        reader: &mut dyn RecordRead,
        entities: &dyn EntityResolver,
        scene: Option<&mut dyn SceneGraph>,
    ) -> Result<LoadReport, PersistError> {
        load_table(self, reader, entities, scene)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::SlotKey;
    use crate::task::DeferredTask;
    use crate::testing::{Fixture, HANDLE, tail_base};

    fn third() -> SlotKey {
        SlotKey::new(HANDLE, Gender::Female, Viewpoint::ThirdPerson)
    }

    fn save(engine: &TransformEngine) -> Vec<u8> {
        let mut writer = RecordWriter::new();
        engine.save(&mut writer).unwrap();
        writer.finish()
    }

    #[test]
    fn round_trip_reproduces_table() {
        let source = Fixture::new();
        let static_handle = EntityHandle(0xFFFF_0000_0000_0014);
        let first = SlotKey::new(HANDLE, Gender::Male, Viewpoint::FirstPerson);
        let engine = &source.engine;
        engine.add_override(third(), "Tail", "wind", OverrideValue::position(0, 5.0));
        engine.add_override(third(), "Tail", "wind", OverrideValue::rotation(4, -1.0));
        engine.add_override(third(), "Tail", "gust", OverrideValue::scale(1.5));
        engine.add_override(third(), "Tail", "move", OverrideValue::destination("Spine"));
        engine.add_override(first, "Head", "tilt", OverrideValue::new(OverrideKey::Scale, 0, OverridePayload::Int(2)));
        engine.add_override(first, "Head", "flag", OverrideValue::new(OverrideKey::Position, 1, OverridePayload::Bool(true)));
        let static_key = SlotKey::new(static_handle, Gender::Male, Viewpoint::ThirdPerson);
        engine.add_override(static_key, "Pelvis", "pose", OverrideValue::position(2, -3.25));

        let bytes = save(engine);

        let mut target = Fixture::new();
        target.entities.alive.insert(static_handle);
        let report = target
            .engine
            .load(&mut RecordReader::new(&bytes), &target.entities, Some(&mut target.scene))
            .unwrap();

        assert_eq!(report.restored, vec![HANDLE, static_handle]);
        assert_eq!(report.discarded, 0);
        assert_eq!(target.engine.table().snapshot(), engine.table().snapshot());

        // Registration order survives.
        let names: Vec<String> = target
            .engine
            .table()
            .registration(third(), "Tail")
            .unwrap()
            .names()
            .map(|n| n.to_string())
            .collect();
        assert_eq!(names, ["wind", "gust", "move"]);
    }

    #[test]
    fn content_sourced_override_is_pruned() {
        let source = Fixture::new();
        source
            .engine
            .add_override(third(), "Tail", "Tails.esp", OverrideValue::scale(2.0));
        let bytes = save(&source.engine);

        let target = Fixture::new();
        let report = target
            .engine
            .load(&mut RecordReader::new(&bytes), &target.entities, None)
            .unwrap();

        assert!(report.restored.is_empty());
        assert_eq!(report.pruned, 1);
        assert_eq!(report.discarded, 1);
        assert!(!target.engine.table().contains(HANDLE));
    }

    #[test]
    fn loaded_content_is_kept() {
        let source = Fixture::new();
        source
            .engine
            .add_override(third(), "Tail", "Tails.esp", OverrideValue::scale(2.0));
        let bytes = save(&source.engine);

        let mut target = Fixture::new();
        target.entities.loaded_content.insert("Tails.esp".to_string());
        let report = target
            .engine
            .load(&mut RecordReader::new(&bytes), &target.entities, None)
            .unwrap();
        assert_eq!(report.restored, vec![HANDLE]);
    }

    #[test]
    fn session_overrides_are_stripped() {
        let source = Fixture::new();
        source.engine.add_override(third(), "Tail", "internal", OverrideValue::scale(2.0));
        source.engine.add_override(third(), "Tail", "wind", OverrideValue::position(0, 5.0));
        let bytes = save(&source.engine);

        let target = Fixture::new();
        let report = target
            .engine
            .load(&mut RecordReader::new(&bytes), &target.entities, None)
            .unwrap();

        assert_eq!(report.pruned, 1);
        let registration = target.engine.table().registration(third(), "Tail").unwrap();
        assert!(registration.get("internal").is_none());
        assert!(registration.get("wind").is_some());
    }

    #[test]
    fn stale_handles_are_discarded_and_others_remapped() {
        let source = Fixture::new();
        let gone = EntityHandle(0x2002);
        let moved = EntityHandle(0x3003);
        source.engine.add_override(third(), "Tail", "wind", OverrideValue::scale(2.0));
        source.engine.add_override(
            SlotKey::new(gone, Gender::Male, Viewpoint::ThirdPerson),
            "Tail",
            "wind",
            OverrideValue::scale(2.0),
        );
        source.engine.add_override(
            SlotKey::new(moved, Gender::Male, Viewpoint::ThirdPerson),
            "Tail",
            "wind",
            OverrideValue::scale(3.0),
        );
        let bytes = save(&source.engine);

        let mut target = Fixture::new();
        target.entities.alive.insert(EntityHandle(0x4004));
        let mut reader = RecordReader::new(&bytes).with_resolver(|old| match old {
            0x2002 => None,
            0x3003 => Some(0x4004),
            other => Some(other),
        });
        let report = target.engine.load(&mut reader, &target.entities, None).unwrap();

        assert_eq!(report.restored, vec![HANDLE, EntityHandle(0x4004)]);
        assert_eq!(report.discarded, 1);
        assert!(!target.engine.table().contains(gone));
        assert!(!target.engine.table().contains(moved));
    }

    #[test]
    fn dead_static_handle_is_discarded() {
        let source = Fixture::new();
        let static_handle = EntityHandle(0xFFFF_0000_0000_0099);
        source.engine.add_override(
            SlotKey::new(static_handle, Gender::Male, Viewpoint::ThirdPerson),
            "Tail",
            "wind",
            OverrideValue::scale(2.0),
        );
        let bytes = save(&source.engine);

        let target = Fixture::new();
        // The resolver would happily map it, but static handles bypass it.
        let mut reader = RecordReader::new(&bytes).with_resolver(|_| Some(HANDLE.0));
        let report = target.engine.load(&mut reader, &target.entities, None).unwrap();
        assert!(report.restored.is_empty());
        assert!(target.engine.table().is_empty());
    }

    #[test]
    fn resource_payloads_are_remapped() {
        let source = Fixture::new();
        let resource = |h| OverrideValue::new(OverrideKey::Destination, 1, OverridePayload::Resource(h));
        source.engine.add_override(third(), "Tail", "kept", resource(0x5));
        source.engine.add_override(third(), "Tail", "lost", resource(0x7));
        source.engine.add_override(third(), "Tail", "lost", OverrideValue::scale(2.0));
        let bytes = save(&source.engine);

        let target = Fixture::new();
        let mut reader = RecordReader::new(&bytes).with_resolver(|old| match old {
            0x5 => Some(0x6),
            0x7 => None,
            other => Some(other),
        });
        target.engine.load(&mut reader, &target.entities, None).unwrap();

        let kept = target
            .engine
            .get_override_node_value(third(), "Tail", "kept", OverrideKey::Destination, 1)
            .unwrap();
        assert_eq!(kept.payload, OverridePayload::Resource(0x6));
        assert!(target
            .engine
            .get_override_node_value(third(), "Tail", "lost", OverrideKey::Destination, 1)
            .is_none());
        assert!(target
            .engine
            .get_override_node_value(third(), "Tail", "lost", OverrideKey::Scale, 0)
            .is_some());
    }

    #[test]
    fn unexpected_record_aborts_after_applied_entries() {
        let source = Fixture::new();
        source.engine.add_override(third(), "Tail", "wind", OverrideValue::scale(2.0));
        let mut writer = RecordWriter::new();
        source.engine.save(&mut writer).unwrap();
        writer.open_record(*b"NOTM", 1).unwrap();
        writer.write_bytes(&[1, 2, 3]).unwrap();
        let bytes = writer.finish();

        let target = Fixture::new();
        let err = target
            .engine
            .load(&mut RecordReader::new(&bytes), &target.entities, None)
            .unwrap_err();

        assert!(matches!(err, PersistError::UnexpectedRecord { ref tag, .. } if tag == "NOTM"));
        assert!(target.engine.table().contains(HANDLE));
    }

    #[test]
    fn newer_version_is_rejected() {
        let mut writer = RecordWriter::new();
        writer.open_record(ENTITY_RECORD, SERIALIZATION_VERSION + 1).unwrap();
        writer.write_bytes(&HANDLE.0.to_le_bytes()).unwrap();
        let bytes = writer.finish();

        let target = Fixture::new();
        let err = target
            .engine
            .load(&mut RecordReader::new(&bytes), &target.entities, None)
            .unwrap_err();
        assert!(matches!(err, PersistError::UnsupportedVersion { found: 3, supported: 2 }));
    }

    #[test]
    fn truncated_entry_is_an_error() {
        let source = Fixture::new();
        source.engine.add_override(third(), "Tail", "wind", OverrideValue::scale(2.0));
        let mut bytes = save(&source.engine);
        bytes.truncate(bytes.len() - 3);

        let target = Fixture::new();
        let err = target
            .engine
            .load(&mut RecordReader::new(&bytes), &target.entities, None)
            .unwrap_err();
        assert!(matches!(err, PersistError::Truncated(_)));
    }

    #[test]
    fn empty_entry_is_discarded() {
        let mut writer = RecordWriter::new();
        writer.open_record(ENTITY_RECORD, SERIALIZATION_VERSION).unwrap();
        writer.write_bytes(&HANDLE.0.to_le_bytes()).unwrap();
        writer.write_bytes(&[0]).unwrap();
        let bytes = writer.finish();

        let target = Fixture::new();
        let report = target
            .engine
            .load(&mut RecordReader::new(&bytes), &target.entities, None)
            .unwrap();
        assert_eq!(report.discarded, 1);
        assert!(target.engine.table().is_empty());
    }

    #[test]
    fn invalid_slot_is_an_error() {
        let mut writer = RecordWriter::new();
        writer.open_record(ENTITY_RECORD, SERIALIZATION_VERSION).unwrap();
        writer.write_bytes(&HANDLE.0.to_le_bytes()).unwrap();
        writer.write_bytes(&[1, 2, 0]).unwrap();
        let bytes = writer.finish();

        let target = Fixture::new();
        let err = target
            .engine
            .load(&mut RecordReader::new(&bytes), &target.entities, None)
            .unwrap_err();
        assert!(matches!(err, PersistError::InvalidSlot(2)));
    }

    #[test]
    fn load_applies_inline_without_queue() {
        let source = Fixture::new();
        source.engine.add_override(third(), "Tail", "wind", OverrideValue::position(0, 5.0));
        let bytes = save(&source.engine);

        let mut target = Fixture::new();
        target
            .engine
            .load(&mut RecordReader::new(&bytes), &target.entities, Some(&mut target.scene))
            .unwrap();
        let tail = target.local(Viewpoint::ThirdPerson, "Tail");
        assert_eq!(tail.translation.x - tail_base().translation.x, 5.0);
    }

    #[test]
    fn load_queues_recompute_with_queue() {
        let source = Fixture::new();
        source.engine.add_override(third(), "Tail", "wind", OverrideValue::position(0, 5.0));
        let bytes = save(&source.engine);

        let (mut target, receiver) = Fixture::new().with_queue();
        target
            .engine
            .load(&mut RecordReader::new(&bytes), &target.entities, Some(&mut target.scene))
            .unwrap();

        assert_eq!(target.local(Viewpoint::ThirdPerson, "Tail"), tail_base());
        assert_eq!(receiver.drain(), vec![DeferredTask::Recompute { handle: HANDLE }]);
    }

    #[test]
    fn oversized_string_fails_the_save() {
        let source = Fixture::new();
        let other = EntityHandle(0x2002);
        let long_name = "x".repeat(MAX_STRING_LEN + 1);
        source.engine.add_override(third(), "Tail", "move", OverrideValue::destination(&long_name));
        source.engine.add_override(
            SlotKey::new(other, Gender::Male, Viewpoint::ThirdPerson),
            "Tail",
            "gust",
            OverrideValue::scale(2.0),
        );

        let mut writer = RecordWriter::new();
        let err = source.engine.save(&mut writer).unwrap_err();
        assert!(matches!(
            err,
            PersistError::StringTooLong { len, max } if len == MAX_STRING_LEN + 1 && max == MAX_STRING_LEN
        ));
    }

    #[test]
    fn string_at_the_limit_round_trips() {
        let source = Fixture::new();
        let name = "n".repeat(MAX_STRING_LEN);
        source.engine.add_override(third(), "Tail", &name, OverrideValue::scale(2.0));
        let bytes = save(&source.engine);

        let target = Fixture::new();
        target
            .engine
            .load(&mut RecordReader::new(&bytes), &target.entities, None)
            .unwrap();
        assert_eq!(target.engine.table().snapshot(), source.engine.table().snapshot());
    }

    #[test]
    fn oversized_string_length_is_rejected_on_read() {
        let mut writer = RecordWriter::new();
        writer.open_record(*b"AAAA", 1).unwrap();
        writer.write_bytes(&((MAX_STRING_LEN as u32) + 1).to_le_bytes()).unwrap();
        let bytes = writer.finish();

        let mut reader = RecordReader::new(&bytes);
        reader.next_record().unwrap();
        assert!(matches!(
            read_string(&mut reader, "node name"),
            Err(PersistError::StringTooLong { .. })
        ));
    }

    #[test]
    fn write_without_open_record_fails() {
        let mut writer = RecordWriter::new();
        assert!(matches!(writer.write_bytes(&[1]), Err(PersistError::NoOpenRecord)));
        assert!(RecordReader::new(&writer.finish()).next_record().unwrap().is_none());
    }

    #[test]
    fn reader_skips_unread_record_tail() {
        let mut writer = RecordWriter::new();
        writer.open_record(*b"AAAA", 1).unwrap();
        writer.write_bytes(&[9; 10]).unwrap();
        writer.open_record(*b"BBBB", 2).unwrap();
        writer.write_bytes(&7u32.to_le_bytes()).unwrap();
        let bytes = writer.finish();

        let mut reader = RecordReader::new(&bytes);
        let first = reader.next_record().unwrap().unwrap();
        assert_eq!((first.tag, first.length), (*b"AAAA", 10));
        let second = reader.next_record().unwrap().unwrap();
        assert_eq!((second.tag, second.version), (*b"BBBB", 2));
        assert_eq!(read_u32(&mut reader, "test").unwrap(), 7);
        assert!(matches!(read_u8(&mut reader, "past end"), Err(PersistError::Truncated("past end"))));
        assert!(reader.next_record().unwrap().is_none());
    }
}
