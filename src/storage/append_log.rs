use serde_json::Value;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// Durable per-stream sink. Entries land in call order; a returned error
/// means this entry was not written and earlier entries are untouched.
pub trait AppendSink: Send {
    fn append(&mut self, entry: &str) -> io::Result<()>;

    fn path(&self) -> &Path;
}

/// Bytes read per step when scanning back for the last complete line
const TAIL_CHUNK: u64 = 4096;

/// Newline-terminated lines, opened for append on first use.
///
/// An unterminated fragment left at the end of the file by an interrupted
/// write is cut off when the file is (re)opened, so the next entry always
/// starts its own line.
pub struct LineLog {
    path: PathBuf,
    sync_each_append: bool,
    file: Option<File>,
}

impl LineLog {
    pub fn new(path: impl Into<PathBuf>, sync_each_append: bool) -> Self {
        LineLog {
            path: path.into(),
            sync_each_append,
            file: None,
        }
    }

    fn file(&mut self) -> io::Result<&mut File> {
        if self.file.is_none() {
            if let Some(parent) = self.path.parent() {
                fs::create_dir_all(parent)?;
            }
            let mut file = OpenOptions::new()
                .create(true)
                .read(true)
                .append(true)
                .open(&self.path)?;
            let trimmed = trim_partial_tail(&mut file)?;
            if trimmed > 0 {
                log::warn!(
                    "Dropped {} bytes of unterminated line at the end of {}",
                    trimmed,
                    self.path.display()
                );
            }
            self.file = Some(file);
        }
        self.file
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "log file not open"))
    }
}

/// Truncate back to just after the last `\n`, returning the bytes removed
fn trim_partial_tail(file: &mut File) -> io::Result<u64> {
    let len = file.metadata()?.len();
    let mut buf = vec![0u8; TAIL_CHUNK as usize];
    let mut end = len;

    while end > 0 {
        let start = end.saturating_sub(TAIL_CHUNK);
        let chunk = &mut buf[..(end - start) as usize];
        file.seek(SeekFrom::Start(start))?;
        file.read_exact(chunk)?;

        if let Some(pos) = chunk.iter().rposition(|&b| b == b'\n') {
            let keep = start + pos as u64 + 1;
            if keep < len {
                file.set_len(keep)?;
            }
            return Ok(len - keep);
        }
        end = start;
    }

    if len > 0 {
        file.set_len(0)?;
    }
    Ok(len)
}

impl AppendSink for LineLog {
    fn append(&mut self, entry: &str) -> io::Result<()> {
        let sync = self.sync_each_append;
        let mut line = String::with_capacity(entry.len() + 1);
        line.push_str(entry.trim_end_matches('\n'));
        line.push('\n');

        let result = self.file().and_then(|file| {
            file.write_all(line.as_bytes())?;
            file.flush()?;
            if sync {
                file.sync_data()?;
            }
            Ok(())
        });

        // Reopen on the next call rather than keep a handle in an unknown state
        if result.is_err() {
            self.file = None;
        }
        result
    }

    fn path(&self) -> &Path {
        &self.path
    }
}

/// Whole-file JSON array, read, extended and replaced on every append.
///
/// O(n) per entry. The replacement goes through a sibling temp file and a
/// rename so a reader never sees a truncated array.
pub struct JsonArrayLog {
    path: PathBuf,
    sync_each_append: bool,
}

impl JsonArrayLog {
    pub fn new(path: impl Into<PathBuf>, sync_each_append: bool) -> Self {
        JsonArrayLog {
            path: path.into(),
            sync_each_append,
        }
    }

    fn read_existing(&self) -> io::Result<Vec<Value>> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(Vec::new());
        }

        match serde_json::from_slice::<Value>(&bytes) {
            Ok(Value::Array(items)) => Ok(items),
            // Refuse to replace a file we cannot read back
            Ok(_) => Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("{} is not a JSON array", self.path.display()),
            )),
            Err(e) => Err(io::Error::new(io::ErrorKind::InvalidData, e)),
        }
    }
}

impl AppendSink for JsonArrayLog {
    fn append(&mut self, entry: &str) -> io::Result<()> {
        let element: Value = serde_json::from_str(entry)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;

        let mut items = self.read_existing()?;
        items.push(element);

        let bytes = serde_json::to_vec_pretty(&Value::Array(items))
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let tmp_path = self.path.with_extension("json.tmp");
        {
            let mut tmp = File::create(&tmp_path)?;
            tmp.write_all(&bytes)?;
            if self.sync_each_append {
                tmp.sync_all()?;
            }
        }
        fs::rename(&tmp_path, &self.path)
    }

    fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formatter::parse_gps_line;

    #[test]
    fn test_line_log_creates_then_appends() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Sensor").join("imu.txt");
        let mut log = LineLog::new(&path, false);

        log.append("1,2,3").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "1,2,3\n");

        log.append("4,5,6\n").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "1,2,3\n4,5,6\n");
    }

    #[test]
    fn test_line_log_preserves_prefix() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gps.txt");
        let mut log = LineLog::new(&path, true);

        for i in 0..50 {
            let before = fs::read_to_string(&path).unwrap_or_default();
            log.append(&format!("{},22.3,114.2,10,3,5", i)).unwrap();
            let after = fs::read_to_string(&path).unwrap();
            assert!(after.starts_with(&before));
            assert_eq!(after.lines().count(), i + 1);
        }
    }

    #[test]
    fn test_line_log_reopens_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("compass.txt");
        fs::write(&path, "1,0,0,0\n").unwrap();

        let mut log = LineLog::new(&path, false);
        log.append("2,1,1,1").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "1,0,0,0\n2,1,1,1\n");
    }

    #[test]
    fn test_line_log_cuts_unterminated_tail() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gps.txt");
        fs::write(&path, "1,22.3,114.2,10,3,5\n1700").unwrap();

        let mut log = LineLog::new(&path, false);
        log.append("1701,22.3,114.2,10,3,5").unwrap();

        let text = fs::read_to_string(&path).unwrap();
        assert_eq!(text, "1,22.3,114.2,10,3,5\n1701,22.3,114.2,10,3,5\n");
        let stamps: Vec<f64> = text
            .lines()
            .map(|l| parse_gps_line(l).unwrap().timestamp)
            .collect();
        assert_eq!(stamps, vec![1.0, 1701.0]);
    }

    #[test]
    fn test_line_log_cuts_fragment_longer_than_scan_chunk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("imu.txt");
        let fragment = "9".repeat(TAIL_CHUNK as usize * 2 + 17);
        fs::write(&path, format!("1,0,0,0\n{}", fragment)).unwrap();

        let mut log = LineLog::new(&path, false);
        log.append("2,1,1,1").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "1,0,0,0\n2,1,1,1\n");
    }

    #[test]
    fn test_line_log_drops_file_that_is_all_fragment() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("compass.txt");
        fs::write(&path, "17").unwrap();

        let mut log = LineLog::new(&path, false);
        log.append("3,1,2,3").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "3,1,2,3\n");
    }

    #[test]
    fn test_json_array_log_preserves_prefix() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("transform.json");
        let mut log = JsonArrayLog::new(&path, false);

        let mut previous: Vec<Value> = Vec::new();
        for i in 0..10 {
            log.append(&format!(r#"{{"timestamp": {}, "w": 1920}}"#, i)).unwrap();
            let items: Vec<Value> = serde_json::from_slice(&fs::read(&path).unwrap()).unwrap();
            assert_eq!(items.len(), i + 1);
            assert_eq!(&items[..i], &previous[..]);
            assert_eq!(items[i]["timestamp"], i);
            previous = items;
        }
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[test]
    fn test_json_array_log_rejects_bad_entry_and_keeps_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("transform.json");
        let mut log = JsonArrayLog::new(&path, false);

        log.append(r#"{"timestamp": 1}"#).unwrap();
        assert!(log.append("not json").is_err());

        let items: Vec<Value> = serde_json::from_slice(&fs::read(&path).unwrap()).unwrap();
        assert_eq!(items.len(), 1);
    }

    #[test]
    fn test_json_array_log_refuses_to_clobber_non_array() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("transform.json");
        fs::write(&path, r#"{"oops": true}"#).unwrap();

        let mut log = JsonArrayLog::new(&path, false);
        let err = log.append(r#"{"timestamp": 1}"#).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
        assert_eq!(fs::read_to_string(&path).unwrap(), r#"{"oops": true}"#);
    }
}
