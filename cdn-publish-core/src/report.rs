//! User-facing output. Diagnostics go through `tracing`; results go through a [`Reporter`].

use std::sync::Mutex;

use tabled::settings::Style;
use tabled::{Table, Tabled};

use crate::contract::{FileMeta, PullZoneMeta};

pub trait Reporter: Send + Sync {
    fn message(&self, line: &str);
    fn table(&self, table: Table);
}

/// Prints to stdout.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleReporter;

impl Reporter for ConsoleReporter {
    fn message(&self, line: &str) {
        println!("{line}");
    }

    fn table(&self, mut table: Table) {
        table.with(Style::modern());
        println!("{table}");
    }
}

/// Keeps every line in memory.
#[derive(Debug, Default)]
pub struct MemoryReporter {
    lines: Mutex<Vec<String>>,
}

impl MemoryReporter {
    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().map(|l| l.clone()).unwrap_or_default()
    }

    fn push(&self, line: String) {
        if let Ok(mut lines) = self.lines.lock() {
            lines.push(line);
        }
    }
}

impl Reporter for MemoryReporter {
    fn message(&self, line: &str) {
        self.push(line.to_string());
    }

    fn table(&self, table: Table) {
        self.push(table.to_string());
    }
}

pub fn progress_line(done: usize, total: usize) -> String {
    let pct = if total == 0 {
        100.0
    } else {
        done as f64 * 100.0 / total as f64
    };
    format!("Put files: {done}/{total} ({pct:.2}%)")
}

#[derive(Debug, Clone, Tabled)]
pub struct ListingRow {
    pub dir: String,
    pub file: String,
    #[tabled(rename = "type")]
    pub kind: &'static str,
}

impl From<&FileMeta> for ListingRow {
    fn from(meta: &FileMeta) -> Self {
        Self {
            dir: meta.path.clone(),
            file: meta.object_name.clone(),
            kind: if meta.is_directory { "d" } else { "f" },
        }
    }
}

pub fn listing_table(items: &[FileMeta]) -> Table {
    Table::new(items.iter().map(ListingRow::from))
}

#[derive(Debug, Clone, Tabled)]
pub struct PullZoneRow {
    pub id: u64,
    pub name: String,
}

impl From<&PullZoneMeta> for PullZoneRow {
    fn from(zone: &PullZoneMeta) -> Self {
        Self {
            id: zone.id,
            name: zone.name.clone(),
        }
    }
}

pub fn pull_zone_table(zones: &[PullZoneMeta]) -> Table {
    Table::new(zones.iter().map(PullZoneRow::from))
}

#[derive(Debug, Clone, PartialEq, Eq, Tabled)]
pub struct PurgeRow {
    #[tabled(rename = "idZone")]
    pub id_zone: u64,
    pub purged: String,
}
