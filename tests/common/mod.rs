// Common test utilities shared across acceptance tests
//
// Every test gets its own temporary studio directory holding scene files and
// cache output, so tests can run in parallel without sharing any files.

use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Scratch directory with scene files and a cache output area
pub struct TestStudio {
    temp_dir: TempDir,
}

#[allow(dead_code)]
impl TestStudio {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().unwrap();
        fs::create_dir_all(temp_dir.path().join("scenes")).unwrap();
        fs::create_dir_all(temp_dir.path().join("cache")).unwrap();
        Self { temp_dir }
    }

    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Create an (empty) scene file and return its path as a job-file string
    pub fn scene(&self, name: &str) -> String {
        let path = self.path().join("scenes").join(name);
        fs::write(&path, b"hip").unwrap();
        path.to_string_lossy().to_string()
    }

    /// Path of a scene that does not exist on disk
    pub fn missing_scene(&self, name: &str) -> String {
        self.path()
            .join("scenes")
            .join(name)
            .to_string_lossy()
            .to_string()
    }

    /// Evaluated output template for a `.bgeo.sc` cache starting at `start`
    pub fn bgeo_template(&self, name: &str, start: i64) -> String {
        self.path()
            .join("cache")
            .join(format!("{}.{:04}.bgeo.sc", name, start))
            .to_string_lossy()
            .to_string()
    }

    /// Where frame `frame` of the `.bgeo.sc` cache `name` lands
    pub fn bgeo_frame(&self, name: &str, frame: i64) -> PathBuf {
        self.path()
            .join("cache")
            .join(format!("{}.{:04}.bgeo.sc", name, frame))
    }

    /// Write a file into the studio and return its path
    pub fn write(&self, name: &str, content: &str) -> PathBuf {
        let path = self.path().join(name);
        fs::write(&path, content).unwrap();
        path
    }
}
