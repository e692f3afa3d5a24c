use std::collections::HashMap;
use std::fmt::{self, Display, Formatter};
use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::Path;
use std::time::SystemTime;

use memmap2::MmapMut;
use prost::Message;
use serde::ser::SerializeStruct;
use serde::{Serialize, Serializer};

use crate::heap_stats::HeapSnapshot;
use crate::pprof::{Function, Line, Location, Sample, ValueType};
use crate::profile::Profile;
use crate::tree::NodeId;

/// Errors that can occur when exporting or streaming profiles.
#[derive(Debug)]
pub enum ExportError {
  Encode(prost::EncodeError),
  Io(io::Error),
  Json(serde_json::Error),
}

impl Display for ExportError {
  fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
    match self {
      Self::Io(err) => write!(f, "i/o error during export: {err}"),
      Self::Json(err) => write!(f, "failed to encode profile as json: {err}"),
      Self::Encode(err) => {
        write!(f, "failed to encode profile as pprof: {err}")
      }
    }
  }
}

impl std::error::Error for ExportError {
  fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
    match self {
      Self::Io(err) => Some(err),
      Self::Json(err) => Some(err),
      Self::Encode(err) => Some(err),
    }
  }
}

impl From<io::Error> for ExportError {
  fn from(value: io::Error) -> Self {
    Self::Io(value)
  }
}

impl From<serde_json::Error> for ExportError {
  fn from(value: serde_json::Error) -> Self {
    Self::Json(value)
  }
}

impl From<prost::EncodeError> for ExportError {
  fn from(value: prost::EncodeError) -> Self {
    Self::Encode(value)
  }
}

#[derive(Serialize)]
struct FrameExport<'a> {
  function: &'a str,
  line: u32,
  script: &'a str,
}

#[derive(Serialize)]
struct RecordExport {
  count: u32,
  size: u64,
}

#[derive(Serialize)]
struct SampleExport<'a> {
  path: Vec<FrameExport<'a>>,
  size: u64,
}

#[derive(Serialize)]
struct NodeExport<'a> {
  allocations: Vec<RecordExport>,
  children: Vec<NodeExport<'a>>,
  function: &'a str,
  line: u32,
  script: &'a str,
}

fn export_node(profile: &Profile, id: NodeId) -> NodeExport<'_> {
  let node = profile.node(id);
  NodeExport {
    allocations: node
      .allocations()
      .iter()
      .map(|record| RecordExport {
        count: record.count,
        size: record.size,
      })
      .collect(),
    children: node
      .children()
      .iter()
      .map(|child| export_node(profile, *child))
      .collect(),
    function: node.frame().function_name.as_ref(),
    line: node.frame().line_number,
    script: node.frame().script_name.as_ref(),
  }
}

impl Serialize for Profile {
  fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
  where
    S: Serializer,
  {
    let samples = self
      .samples()
      .iter()
      .map(|sample| SampleExport {
        path: sample
          .path
          .iter()
          .map(|frame| FrameExport {
            function: frame.function_name.as_ref(),
            line: frame.line_number,
            script: frame.script_name.as_ref(),
          })
          .collect(),
        size: sample.size,
      })
      .collect::<Vec<SampleExport<'_>>>();

    let mut state = serializer.serialize_struct("Profile", 2)?;
    state.serialize_field("samples", &samples)?;
    state.serialize_field("tree", &export_node(self, self.root()))?;
    state.end()
  }
}

impl Profile {
  /// Serialize the profile to JSON using the provided writer.
  ///
  /// # Errors
  ///
  /// Returns an error if serialization to JSON fails.
  pub fn export_json<W: Write>(&self, writer: W) -> Result<(), ExportError> {
    serde_json::to_writer(writer, self)?;
    Ok(())
  }

  /// Serialize the profile to the pprof proto format.
  ///
  /// # Errors
  ///
  /// Returns an error if the profile cannot be encoded or written to the
  /// provided writer.
  pub fn export_pprof<W: Write>(&self, mut writer: W) -> Result<(), ExportError> {
    let profile = build_pprof_profile(self);
    let mut buffer = Vec::with_capacity(4096);
    profile.encode(&mut buffer)?;
    writer.write_all(&buffer)?;
    Ok(())
  }

  /// Stream this profile into the provided writer.
  ///
  /// # Errors
  ///
  /// Returns an error if the downstream writer reports a failure.
  pub fn stream_into<W: ProfileStreamWriter>(
    &self,
    writer: &mut W,
    timestamp: Option<SystemTime>,
  ) -> Result<(), ExportError> {
    writer.write_profile(self, timestamp)
  }
}

impl HeapSnapshot {
  /// Serialize the snapshot to JSON using the provided writer.
  ///
  /// # Errors
  ///
  /// Returns an error if serialization to JSON fails.
  pub fn export_json<W: Write>(&self, writer: W) -> Result<(), ExportError> {
    serde_json::to_writer(writer, self)?;
    Ok(())
  }
}

/// Streaming interface for profile consumers.
pub trait ProfileStreamWriter {
  /// # Errors
  ///
  /// Returns an `ExportError` if the profile cannot be serialized or if the
  /// underlying writer fails to persist the data.
  fn write_profile(
    &mut self,
    profile: &Profile,
    timestamp: Option<SystemTime>,
  ) -> Result<(), ExportError>;
}

/// JSON lines exporter that writes one JSON object per profile.
pub struct JsonLinesWriter<W: Write> {
  writer: W,
}

impl<W: Write> ProfileStreamWriter for JsonLinesWriter<W> {
  fn write_profile(
    &mut self,
    profile: &Profile,
    timestamp: Option<SystemTime>,
  ) -> Result<(), ExportError> {
    let chunk = StreamChunk::new(profile, timestamp);
    serde_json::to_writer(&mut self.writer, &chunk)?;
    self.writer.write_all(b"\n")?;
    Ok(())
  }
}

impl<W: Write> JsonLinesWriter<W> {
  pub fn into_inner(self) -> W {
    self.writer
  }

  pub fn new(writer: W) -> Self {
    Self { writer }
  }
}

/// Streaming writer backed by an mmap'd file.
pub struct MmapStreamWriter {
  mmap: MmapMut,
  position: usize,
}

impl ProfileStreamWriter for MmapStreamWriter {
  fn write_profile(
    &mut self,
    profile: &Profile,
    timestamp: Option<SystemTime>,
  ) -> Result<(), ExportError> {
    let chunk = StreamChunk::new(profile, timestamp);
    let mut encoded = serde_json::to_vec(&chunk)?;
    encoded.push(b'\n');
    self.write_bytes(&encoded)?;
    Ok(())
  }
}

impl MmapStreamWriter {
  /// # Errors
  ///
  /// Returns an error if the backing file cannot be created, resized, or
  /// mapped into memory.
  pub fn create(path: impl AsRef<Path>, capacity: usize) -> io::Result<Self> {
    let capacity = capacity.max(1);

    let file = OpenOptions::new()
      .create(true)
      .write(true)
      .read(true)
      .truncate(true)
      .open(path)?;

    let capacity_u64 = u64::try_from(capacity)
      .map_err(|_| io::Error::other("capacity exceeds u64"))?;

    file.set_len(capacity_u64)?;

    // SAFETY: the file handle remains open for the lifetime of the mapping.
    let mmap = unsafe { MmapMut::map_mut(&file)? };

    Ok(Self { mmap, position: 0 })
  }

  /// # Errors
  ///
  /// Returns an error if flushing the memory-mapped region fails.
  pub fn flush(&self) -> io::Result<()> {
    self.mmap.flush_async()?;
    Ok(())
  }

  /// # Errors
  ///
  /// Returns an error if the write would exceed the reserved capacity.
  fn write_bytes(&mut self, data: &[u8]) -> io::Result<()> {
    let Some(end) = self.position.checked_add(data.len()) else {
      return Err(io::Error::other("mmap position overflow"));
    };

    if end > self.mmap.len() {
      return Err(io::Error::new(
        io::ErrorKind::WriteZero,
        "mmap capacity exceeded",
      ));
    }

    self.mmap[self.position..end].copy_from_slice(data);

    self.position = end;

    Ok(())
  }
}

#[derive(Serialize)]
struct StreamChunk<'a> {
  profile: &'a Profile,
  #[serde(skip_serializing_if = "Option::is_none")]
  timestamp_ns: Option<u128>,
}

impl<'a> StreamChunk<'a> {
  fn new(profile: &'a Profile, timestamp: Option<SystemTime>) -> Self {
    Self {
      profile,
      timestamp_ns: timestamp.and_then(system_time_to_nanos),
    }
  }
}

struct StringTable {
  entries: Vec<String>,
  index: HashMap<String, i64>,
}

impl StringTable {
  fn intern(&mut self, value: &str) -> i64 {
    if let Some(index) = self.index.get(value) {
      return *index;
    }

    let index = i64::try_from(self.entries.len()).unwrap_or(i64::MAX);

    self.entries.push(value.to_string());
    self.index.insert(value.to_string(), index);

    index
  }

  fn into_vec(self) -> Vec<String> {
    self.entries
  }

  fn new() -> Self {
    Self {
      entries: vec![String::new()],
      index: HashMap::from([(String::new(), 0)]),
    }
  }
}

fn system_time_to_nanos(ts: SystemTime) -> Option<u128> {
  ts.duration_since(SystemTime::UNIX_EPOCH)
    .ok()
    .map(|duration| duration.as_nanos())
}

/// Call path of `id`, leaf first, excluding the synthetic root node.
fn path_to_root(profile: &Profile, id: NodeId) -> Vec<NodeId> {
  let mut path = Vec::new();
  let mut current = Some(id);

  while let Some(node_id) = current {
    let node = profile.node(node_id);
    if node.parent().is_none() {
      break;
    }
    path.push(node_id);
    current = node.parent();
  }

  path
}

#[must_use]
pub fn build_pprof_profile(profile: &Profile) -> crate::pprof::Profile {
  let mut string_table = StringTable::new();

  let mut functions = Vec::new();
  let mut locations = Vec::new();
  let mut samples = Vec::new();

  let size_type = ValueType {
    ty: string_table.intern("space"),
    unit: string_table.intern("bytes"),
  };

  let count_type = ValueType {
    ty: string_table.intern("allocations"),
    unit: string_table.intern("count"),
  };

  let mut function_ids = HashMap::new();
  let mut location_ids = HashMap::new();

  let mut next_function_id = 1;
  let mut next_location_id = 1;

  let mut pending = vec![profile.root()];
  while let Some(id) = pending.pop() {
    let node = profile.node(id);
    pending.extend(node.children().iter().copied());

    if node.allocations().is_empty() {
      continue;
    }

    let mut stack_location_ids = Vec::new();

    for path_id in path_to_root(profile, id) {
      let frame = profile.node(path_id).frame();
      let script_idx = string_table.intern(frame.script_name.as_ref());
      let function_name_idx = string_table.intern(frame.function_name.as_ref());

      let function_id = *function_ids
        .entry((script_idx, function_name_idx, frame.line_number))
        .or_insert_with(|| {
          let function = Function {
            id: next_function_id,
            name: function_name_idx,
            system_name: function_name_idx,
            filename: script_idx,
            start_line: i64::from(frame.line_number),
          };

          functions.push(function);

          next_function_id += 1;
          next_function_id - 1
        });

      let location_id = *location_ids
        .entry((function_id, frame.line_number))
        .or_insert_with(|| {
          let line = Line {
            function_id,
            line: i64::from(frame.line_number),
          };

          let location = Location {
            id: next_location_id,
            mapping_id: 0,
            address: 0,
            line: vec![line],
            is_folded: false,
          };

          locations.push(location);

          next_location_id += 1;
          next_location_id - 1
        });

      stack_location_ids.push(location_id);
    }

    if stack_location_ids.is_empty() {
      // Samples recorded at the synthetic root still need a frame so tools
      // show the allocation bucket.
      let unknown_label = string_table.intern("<unknown>");

      let function_id = *function_ids
        .entry((unknown_label, unknown_label, 0))
        .or_insert_with(|| {
          let function = Function {
            id: next_function_id,
            name: unknown_label,
            system_name: unknown_label,
            filename: unknown_label,
            start_line: 0,
          };

          functions.push(function);

          next_function_id += 1;
          next_function_id - 1
        });

      let location_id =
        *location_ids.entry((function_id, 0)).or_insert_with(|| {
          let line = Line {
            function_id,
            line: 0,
          };

          let location = Location {
            id: next_location_id,
            mapping_id: 0,
            address: 0,
            line: vec![line],
            is_folded: false,
          };

          locations.push(location);

          next_location_id += 1;
          next_location_id - 1
        });

      stack_location_ids.push(location_id);
    }

    let bytes_value = i64::try_from(node.total_size()).unwrap_or(i64::MAX);
    let count_value = i64::try_from(node.total_count()).unwrap_or(i64::MAX);

    let sample = Sample {
      location_id: stack_location_ids,
      value: vec![bytes_value, count_value],
      label: Vec::new(),
    };

    samples.push(sample);
  }

  crate::pprof::Profile {
    sample_type: vec![size_type, count_type],
    sample: samples,
    mapping: Vec::new(),
    location: locations,
    function: functions,
    string_table: string_table.into_vec(),
    drop_frames: 0,
    keep_frames: 0,
    time_nanos: 0,
    duration_nanos: 0,
    period_type: Some(ValueType { ty: 0, unit: 0 }),
    period: 1,
    comment: Vec::new(),
    default_sample_type: 0,
  }
}
