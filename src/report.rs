//! Flat-text run report.
//!
//! The report mirrors what the run printed: a configuration echo, the
//! baseline and plain-loop accuracies, one block per generation of the
//! evolutionary search, and the final accuracy figures.

use std::fmt::Write as _;
use std::path::Path;

use crate::error::Result;
use crate::evolve::{GenerationStats, SearchOutcome};

#[derive(Default)]
pub struct RunReport {
    buf: String,
}

impl RunReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn section(&mut self, title: &str) {
        let _ = writeln!(self.buf, "---------------{}-----------------", title);
    }

    pub fn kv(&mut self, key: &str, value: impl std::fmt::Display) {
        let _ = writeln!(self.buf, "{}: {}", key, value);
    }

    pub fn line(&mut self, text: impl AsRef<str>) {
        let _ = writeln!(self.buf, "{}", text.as_ref());
    }

    pub fn generation(&mut self, stats: &GenerationStats) {
        let _ = writeln!(self.buf, "*****Generation {}*****", stats.generation);
        let _ = writeln!(self.buf, "Average distance: {:.6}", stats.mean_distance);
        let _ = writeln!(self.buf, "Best fitness: {:.6}", stats.best_fitness);
        let _ = writeln!(
            self.buf,
            "Accuracy of the best individual: {:.6}",
            stats.best_accuracy
        );
        let _ = writeln!(
            self.buf,
            "Accuracy of the 10% population: {:.6}",
            stats.elite_vote_accuracy
        );
        let _ = writeln!(
            self.buf,
            "Accuracy of the population: {:.6}",
            stats.population_vote_accuracy
        );
    }

    pub fn final_results(&mut self, outcome: &SearchOutcome) {
        self.line("*****Final result*****");
        let _ = writeln!(
            self.buf,
            "Accuracy of the best individual: {:.6}",
            outcome.best_accuracy
        );
        let _ = writeln!(
            self.buf,
            "Accuracy of the refined best individual: {:.6}",
            outcome.refined_accuracy
        );
        let _ = writeln!(
            self.buf,
            "Accuracy of the 10% population: {:.6}",
            outcome.elite_vote_accuracy
        );
        let _ = writeln!(
            self.buf,
            "Accuracy of the population: {:.6}",
            outcome.population_vote_accuracy
        );
        let _ = writeln!(
            self.buf,
            "Accuracy of the archive: {:.6}",
            outcome.archive_vote_accuracy
        );
        let _ = writeln!(self.buf, "GA-MEDA time: {:.3}", outcome.search_seconds);
    }

    pub fn as_str(&self) -> &str {
        &self.buf
    }

    pub fn write_to(&self, path: &Path) -> Result<()> {
        std::fs::write(path, &self.buf)?;
        Ok(())
    }
}
