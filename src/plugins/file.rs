//! File input and output plugins.
//!
//! Both read and write packets as raw fixed-size records, back to back,
//! with no framing. The file path is the first plugin argument; the
//! packet size can be overridden with `size=N`.

use crate::error::{Error, Result};
use crate::packet::{Packet, DEFAULT_PACKET_SIZE};
use crate::plugin::{InputPlugin, OutputPlugin, Plugin};
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};

/// An input plugin that reads fixed-size packets from a file.
pub struct FileInput {
    name: String,
    path: Option<String>,
    packet_size: usize,
    reader: Option<BufReader<File>>,
}

impl FileInput {
    /// Create a FileInput. The path comes from the plugin arguments at
    /// `start`, or from [`FileInput::with_path`].
    pub fn new() -> Self {
        Self {
            name: "file".to_string(),
            path: None,
            packet_size: DEFAULT_PACKET_SIZE,
            reader: None,
        }
    }

    /// Set the file path up front.
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Set the packet size in bytes.
    pub fn with_packet_size(mut self, size: usize) -> Self {
        self.packet_size = size.max(1);
        self
    }
}

impl Default for FileInput {
    fn default() -> Self {
        Self::new()
    }
}

impl Plugin for FileInput {
    fn name(&self) -> &str {
        &self.name
    }

    fn start(&mut self, args: &[String]) -> Result<()> {
        for arg in args {
            if let Some(value) = arg.strip_prefix("size=") {
                if let Ok(size) = value.parse::<usize>() {
                    self.packet_size = size.max(1);
                }
            } else if self.path.is_none() {
                self.path = Some(arg.clone());
            }
        }
        let path = self
            .path
            .as_deref()
            .ok_or_else(|| Error::plugin("file", "no input file path given"))?;
        let file = File::open(path)?;
        self.reader = Some(BufReader::new(file));
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        self.reader = None;
        Ok(())
    }
}

impl InputPlugin for FileInput {
    fn receive(&mut self, max_count: usize) -> Result<Vec<Packet>> {
        let reader = self
            .reader
            .as_mut()
            .ok_or_else(|| Error::plugin("file", "receive before start"))?;

        let mut batch = Vec::with_capacity(max_count);
        let mut buf = vec![0u8; self.packet_size];
        for _ in 0..max_count {
            let mut filled = 0;
            while filled < buf.len() {
                let n = reader.read(&mut buf[filled..])?;
                if n == 0 {
                    break;
                }
                filled += n;
            }
            if filled == 0 {
                break; // clean end of file
            }
            if filled < buf.len() {
                return Err(Error::plugin(
                    "file",
                    format!("truncated packet: {} of {} bytes", filled, buf.len()),
                ));
            }
            batch.push(Packet::new(&buf[..]));
        }
        Ok(batch)
    }
}

/// An output plugin that appends fixed-size packets to a file.
pub struct FileOutput {
    name: String,
    path: Option<String>,
    writer: Option<BufWriter<File>>,
}

impl FileOutput {
    /// Create a FileOutput. The path comes from the plugin arguments at
    /// `start`, or from [`FileOutput::with_path`].
    pub fn new() -> Self {
        Self {
            name: "file".to_string(),
            path: None,
            writer: None,
        }
    }

    /// Set the file path up front.
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }
}

impl Default for FileOutput {
    fn default() -> Self {
        Self::new()
    }
}

impl Plugin for FileOutput {
    fn name(&self) -> &str {
        &self.name
    }

    fn start(&mut self, args: &[String]) -> Result<()> {
        if self.path.is_none() {
            self.path = args.first().cloned();
        }
        let path = self
            .path
            .as_deref()
            .ok_or_else(|| Error::plugin("file", "no output file path given"))?;
        let file = File::create(path)?;
        self.writer = Some(BufWriter::new(file));
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        if let Some(mut writer) = self.writer.take() {
            writer.flush()?;
        }
        Ok(())
    }
}

impl OutputPlugin for FileOutput {
    fn send(&mut self, packets: &[Packet]) -> Result<()> {
        let writer = self
            .writer
            .as_mut()
            .ok_or_else(|| Error::plugin("file", "send before start"))?;
        for packet in packets {
            writer.write_all(packet.payload())?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn test_file_round_trip() {
        let file = NamedTempFile::new().unwrap();
        let path = file.path().to_str().unwrap().to_string();

        let mut output = FileOutput::new().with_path(&path);
        output.start(&[]).unwrap();
        let packets: Vec<Packet> = (0..3).map(|i| Packet::new(&[i as u8; 4][..])).collect();
        output.send(&packets).unwrap();
        output.stop().unwrap();

        let mut input = FileInput::new().with_path(&path).with_packet_size(4);
        input.start(&[]).unwrap();
        let batch = input.receive(10).unwrap();
        assert_eq!(batch.len(), 3);
        assert_eq!(batch[1].payload(), &[1, 1, 1, 1]);

        // Next receive is a clean end of stream.
        assert!(input.receive(10).unwrap().is_empty());
    }

    #[test]
    fn test_file_input_path_from_args() {
        let file = NamedTempFile::new().unwrap();
        std::fs::write(file.path(), [0u8; 8]).unwrap();
        let path = file.path().to_str().unwrap().to_string();

        let mut input = FileInput::new();
        input.start(&[path, "size=8".to_string()]).unwrap();
        assert_eq!(input.receive(10).unwrap().len(), 1);
    }

    #[test]
    fn test_file_input_truncated_packet() {
        let file = NamedTempFile::new().unwrap();
        std::fs::write(file.path(), [0u8; 10]).unwrap();
        let path = file.path().to_str().unwrap().to_string();

        let mut input = FileInput::new().with_path(path).with_packet_size(8);
        input.start(&[]).unwrap();

        let first = input.receive(1).unwrap();
        assert_eq!(first.len(), 1);
        // 2 stray bytes left: not a whole packet.
        assert!(matches!(
            input.receive(1),
            Err(Error::PluginFailure { .. })
        ));
    }

    #[test]
    fn test_file_input_missing_path() {
        let mut input = FileInput::new();
        assert!(input.start(&[]).is_err());
    }
}
