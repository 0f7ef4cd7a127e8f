//! Test utilities for creating temporary log files.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

pub struct TempLogFile {
    pub path: PathBuf,
    _temp_dir: tempfile::TempDir,
}

impl TempLogFile {
    /// Create a new empty temporary log file
    pub fn new() -> std::io::Result<Self> {
        Self::named("test.log")
    }

    /// Create an empty temporary log file with a given name in its own directory
    pub fn named(name: &str) -> std::io::Result<Self> {
        let temp_dir = tempfile::tempdir()?;
        let path = temp_dir.path().join(name);

        File::create(&path)?;

        Ok(Self {
            path,
            _temp_dir: temp_dir,
        })
    }

    /// Create a temporary log file with initial raw content
    pub fn with_content(content: &str) -> std::io::Result<Self> {
        let temp_file = Self::new()?;
        temp_file.append_raw(content)?;
        Ok(temp_file)
    }

    /// Append a line, newline included
    pub fn append_line(&self, line: &str) -> std::io::Result<()> {
        self.append_raw(&format!("{line}\n"))
    }

    /// Append bytes exactly as given
    pub fn append_raw(&self, content: &str) -> std::io::Result<()> {
        let mut file = OpenOptions::new().append(true).open(&self.path)?;
        file.write_all(content.as_bytes())?;
        file.flush()?;
        Ok(())
    }

    /// Get the path to the temporary file
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_temp_log_file_creation() {
        let temp_file = TempLogFile::new().unwrap();
        assert!(temp_file.path().exists());
    }

    #[test]
    fn test_append_line_and_raw() {
        let temp_file = TempLogFile::with_content("a\n").unwrap();
        temp_file.append_line("b").unwrap();
        temp_file.append_raw("partial").unwrap();

        let content = std::fs::read_to_string(temp_file.path()).unwrap();
        assert_eq!(content, "a\nb\npartial");
    }
}
