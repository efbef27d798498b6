// External imports
use anyhow::Result;
use chrono::Local;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

/// One training run, persisted as JSON for later comparison
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingRunRecord {
    pub timestamp: String,
    pub model_version: String,
    pub training_days: u32,
    pub samples: usize,
    pub features: usize,
    pub sequence_length: usize,
    pub hidden_size: usize,
    pub dense_units: usize,
    pub dropout: f64,
    pub batch_size: usize,
    pub learning_rate: f64,
    pub epochs_run: usize,
    pub best_epoch: usize,
    pub best_val_loss: Option<f64>,
    pub training_time_seconds: Option<f64>,
    pub notes: String,
}

impl TrainingRunRecord {
    pub fn new(model_version: &str, training_days: u32, samples: usize, features: usize) -> Self {
        Self {
            timestamp: Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
            model_version: model_version.to_string(),
            training_days,
            samples,
            features,
            sequence_length: 0,
            hidden_size: 0,
            dense_units: 0,
            dropout: 0.0,
            batch_size: 0,
            learning_rate: 0.0,
            epochs_run: 0,
            best_epoch: 0,
            best_val_loss: None,
            training_time_seconds: None,
            notes: String::new(),
        }
    }

    pub fn set_training_time(&mut self, seconds: f64) {
        self.training_time_seconds = Some(seconds);
    }

    pub fn add_note(&mut self, note: &str) {
        if !self.notes.is_empty() {
            self.notes.push('\n');
        }
        self.notes.push_str(note);
    }

    /// Writes the record into `run_dir` and returns the file path
    pub fn save(&self, run_dir: &Path) -> Result<PathBuf> {
        fs::create_dir_all(run_dir)?;

        let filename = format!(
            "{}_lstm_h{}_w{}_d{}_run.json",
            Local::now().format("%Y%m%d_%H%M%S%3f"),
            self.hidden_size,
            self.sequence_length,
            self.training_days,
        );
        let file_path = run_dir.join(filename);

        let json = serde_json::to_string_pretty(&self)?;
        let mut file = fs::File::create(&file_path)?;
        file.write_all(json.as_bytes())?;

        Ok(file_path)
    }
}

/// Lists saved run records, oldest first
pub fn list_runs(run_dir: &Path) -> Result<Vec<TrainingRunRecord>> {
    if !run_dir.exists() {
        return Ok(Vec::new());
    }
    let mut paths: Vec<PathBuf> = fs::read_dir(run_dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.extension().is_some_and(|ext| ext == "json"))
        .collect();
    paths.sort();

    let mut runs = Vec::with_capacity(paths.len());
    for path in paths {
        let json = fs::read_to_string(&path)?;
        runs.push(serde_json::from_str(&json)?);
    }
    Ok(runs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_save_and_list_runs() {
        let dir = tempfile::tempdir().unwrap();
        let mut record = TrainingRunRecord::new("0.3.0", 7, 108, 21);
        record.best_val_loss = Some(0.01);
        record.add_note("first");
        record.add_note("second");

        let path = record.save(dir.path()).unwrap();
        assert!(path.exists());

        let runs = list_runs(dir.path()).unwrap();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].samples, 108);
        assert_eq!(runs[0].notes, "first\nsecond");
    }
}
