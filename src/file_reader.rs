/*
Copyright 2025 The SN/X Project Developers

Licensed under the Apache License, Version 2.0 (the "License");
you may not use this file except in compliance with the License.
You may obtain a copy of the License at

    http://www.apache.org/licenses/LICENSE-2.0

Unless required by applicable law or agreed to in writing, software
distributed under the License is distributed on an "AS IS" BASIS,
WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
See the License for the specific language governing permissions and
limitations under the License.
*/

use anyhow::{Context, Result};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

pub trait FileReader {
    fn read_to_string(&self, path: &Path) -> Result<String>;
}

// production file reader
pub struct SourceFileReader;

impl FileReader for SourceFileReader {
    fn read_to_string(&self, path: &Path) -> Result<String> {
        fs::read_to_string(path)
            .with_context(|| format!("Failed to read source file: {}", path.display()))
    }
}

// mock file reader for testing
#[derive(Default)]
pub struct MockFileReader {
    files: HashMap<PathBuf, String>,
}

impl MockFileReader {
    pub fn add_file(&mut self, path: &str, content: &str) {
        self.files.insert(PathBuf::from(path), content.to_string());
    }
}

impl FileReader for MockFileReader {
    fn read_to_string(&self, path: &Path) -> Result<String> {
        match self.files.get(path) {
            Some(content) => Ok(content.clone()),
            None => Err(anyhow::anyhow!("Mock file not found: {}", path.display())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_mock_reader_round_trip() {
        let mut reader = MockFileReader::default();
        reader.add_file("prog.snx", "HLT\n");
        assert_eq!(
            reader.read_to_string(Path::new("prog.snx")).unwrap(),
            "HLT\n"
        );
        assert!(reader.read_to_string(Path::new("missing.snx")).is_err());
    }

    #[test]
    fn test_source_reader_reads_real_files() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "main: HLT\n").unwrap();
        let content = SourceFileReader.read_to_string(file.path()).unwrap();
        assert_eq!(content, "main: HLT\n");
    }

    #[test]
    fn test_source_reader_reports_missing_file() {
        let err = SourceFileReader
            .read_to_string(Path::new("/nonexistent/prog.snx"))
            .unwrap_err();
        assert!(err.to_string().contains("Failed to read source file"));
    }
}
