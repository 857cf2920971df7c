//! Multi-year maximum tree height report.

use std::collections::BTreeSet;
use std::io::{self, Write};

use tracing::debug;

use crate::collect::global_variables::TREES_MARKER;
use crate::collect::workspace::{year_from_name, Workspace};
use crate::commons::basic_functions::format_height;
use crate::error::Result;
use crate::geometric::trees::ZonalRow;

const TITLE: &str = "*** MAXIMUM TREE HEIGHT (METERS) PER YEAR ***";

/// Which trees appear as report columns.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum TrackedTrees {
    /// Every id found in any tree table
    #[default]
    All,
    /// An explicit id list, in column order. A table is complete only when
    /// it holds one row per listed id and no other rows.
    Ids(Vec<i64>),
}

/// One report line.
#[derive(Debug, Clone, PartialEq)]
pub struct YearHeights {
    pub year: i32,
    pub table: String,
    /// One height per tracked tree, or `None` unless the table holds exactly
    /// one row for every tracked tree and nothing else
    pub heights: Option<Vec<Option<f64>>>,
}

impl YearHeights {
    pub fn is_complete(&self) -> bool {
        self.heights.is_some()
    }

    pub fn line(&self) -> String {
        match &self.heights {
            Some(heights) => {
                let cells: Vec<String> = heights.iter().map(|h| format_height(*h)).collect();
                format!("{}  {}", self.year, cells.join("   "))
            }
            None => format!("{}  <Incomplete data>", self.year),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TreeReport {
    pub tracked: Vec<i64>,
    pub years: Vec<YearHeights>,
}

impl TreeReport {
    /// Gather every tree table of the workspace, ordered by year then name.
    ///
    /// The year comes from the catalog key; tables registered without one
    /// must be named `<prefix>_<year>_trees`, otherwise `NameFormat` is
    /// returned.
    pub fn collect(workspace: &Workspace, tracked: &TrackedTrees) -> Result<Self> {
        let mut tables = Vec::new();
        for entry in workspace.list(TREES_MARKER) {
            if entry.grid.is_some() {
                continue;
            }
            let year = match entry.key.year {
                Some(year) => year,
                None => year_from_name(&entry.name)?,
            };
            let rows: Vec<ZonalRow> = workspace.read_table(&entry.name)?;
            debug!("Table '{}' ({}): {} rows", entry.name, year, rows.len());
            tables.push((year, entry.name.clone(), rows));
        }
        tables.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(&b.1)));

        let tracked = match tracked {
            TrackedTrees::Ids(ids) => ids.clone(),
            TrackedTrees::All => tables
                .iter()
                .flat_map(|(_, _, rows)| rows.iter().map(|r| r.id))
                .collect::<BTreeSet<i64>>()
                .into_iter()
                .collect(),
        };

        let years = tables
            .into_iter()
            .map(|(year, table, rows)| YearHeights {
                year,
                table,
                heights: heights_for(&rows, &tracked),
            })
            .collect();

        Ok(TreeReport { tracked, years })
    }

    pub fn header(&self) -> String {
        let columns: String = self.tracked.iter().map(|id| format!("  TREE {}", id)).collect();
        format!("YEAR{}", columns)
    }

    pub fn render<W: Write>(&self, out: &mut W) -> io::Result<()> {
        writeln!(out, "{}", TITLE)?;
        writeln!(out, "{}", self.header())?;
        for year in &self.years {
            writeln!(out, "{}", year.line())?;
        }
        Ok(())
    }
}

fn heights_for(rows: &[ZonalRow], tracked: &[i64]) -> Option<Vec<Option<f64>>> {
    if rows.len() != tracked.len() {
        return None;
    }
    tracked
        .iter()
        .map(|id| {
            let mut matching = rows.iter().filter(|r| r.id == *id);
            match (matching.next(), matching.next()) {
                (Some(row), None) => Some(row.max),
                _ => None,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collect::workspace::{ArtifactKey, ArtifactKind, WorkspaceOptions};
    use crate::error::Error;

    fn rows(heights: &[f64]) -> Vec<ZonalRow> {
        heights
            .iter()
            .enumerate()
            .map(|(i, h)| ZonalRow {
                id: i as i64 + 1,
                count: 1,
                area: 0.01,
                max: Some(*h),
            })
            .collect()
    }

    fn workspace(dir: &std::path::Path) -> Workspace {
        Workspace::open(dir, WorkspaceOptions { overwrite: true }).unwrap()
    }

    fn rendered(report: &TreeReport) -> String {
        let mut out = Vec::new();
        report.render(&mut out).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn test_complete_and_incomplete_years() {
        let dir = tempfile::tempdir().unwrap();
        let mut ws = workspace(dir.path());
        let key = |y| ArtifactKey::yearly(ArtifactKind::TreeTable, y);
        ws.save_table("dtm_2019_trees", key(2019), &rows(&[1.1, 2.2, 3.3, 4.4])).unwrap();
        ws.save_table("dtm_2020_trees", key(2020), &rows(&[1.5, 2.5])).unwrap();

        let report = TreeReport::collect(&ws, &TrackedTrees::All).unwrap();
        let text = rendered(&report);
        assert!(text.contains("2019  1.10   2.20   3.30   4.40\n"));
        assert!(text.contains("2020  <Incomplete data>\n"));
        assert!(text.starts_with("*** MAXIMUM TREE HEIGHT (METERS) PER YEAR ***\nYEAR  TREE 1  TREE 2  TREE 3  TREE 4\n"));
        assert!(!report.years[1].is_complete());
    }

    #[test]
    fn test_explicit_tracked_ids() {
        let dir = tempfile::tempdir().unwrap();
        let mut ws = workspace(dir.path());
        ws.save_table(
            "chm_2020_trees",
            ArtifactKey::yearly(ArtifactKind::TreeTable, 2020),
            &rows(&[1.5, 2.5, 3.5]),
        )
        .unwrap();

        let report = TreeReport::collect(&ws, &TrackedTrees::Ids(vec![3, 1, 2])).unwrap();
        assert_eq!(report.header(), "YEAR  TREE 3  TREE 1  TREE 2");
        assert_eq!(report.years[0].line(), "2020  3.50   1.50   2.50");

        let missing = TreeReport::collect(&ws, &TrackedTrees::Ids(vec![1, 2, 9])).unwrap();
        assert_eq!(missing.years[0].line(), "2020  <Incomplete data>");
    }

    #[test]
    fn test_untracked_rows_make_year_incomplete() {
        let dir = tempfile::tempdir().unwrap();
        let mut ws = workspace(dir.path());
        ws.save_table(
            "chm_2021_trees",
            ArtifactKey::yearly(ArtifactKind::TreeTable, 2021),
            &rows(&[1.5, 2.5, 3.5, 4.5, 5.5]),
        )
        .unwrap();

        let report = TreeReport::collect(&ws, &TrackedTrees::Ids(vec![1, 2, 3, 4])).unwrap();
        assert_eq!(report.years[0].line(), "2021  <Incomplete data>");
    }

    #[test]
    fn test_years_sort_numerically() {
        let dir = tempfile::tempdir().unwrap();
        let mut ws = workspace(dir.path());
        let key = ArtifactKey::new(ArtifactKind::TreeTable, None);
        ws.save_table("chm_2019_trees", key, &rows(&[2.0])).unwrap();
        ws.save_table("chm_9_trees", key, &rows(&[1.0])).unwrap();

        let report = TreeReport::collect(&ws, &TrackedTrees::All).unwrap();
        let tables: Vec<&str> = report.years.iter().map(|y| y.table.as_str()).collect();
        // Lexicographic order would put chm_2019_trees first
        assert_eq!(tables, vec!["chm_9_trees", "chm_2019_trees"]);
        assert_eq!(report.years[0].year, 9);
    }

    #[test]
    fn test_name_without_year_fails() {
        let dir = tempfile::tempdir().unwrap();
        let mut ws = workspace(dir.path());
        ws.save_table("oak_trees", ArtifactKey::new(ArtifactKind::TreeTable, None), &rows(&[1.0]))
            .unwrap();
        let err = TreeReport::collect(&ws, &TrackedTrees::All).unwrap_err();
        assert!(matches!(err, Error::NameFormat { ref name } if name == "oak_trees"));
    }

    #[test]
    fn test_catalog_year_wins_over_name() {
        let dir = tempfile::tempdir().unwrap();
        let mut ws = workspace(dir.path());
        ws.save_table(
            "survey_trees",
            ArtifactKey::yearly(ArtifactKind::TreeTable, 2021),
            &rows(&[4.0]),
        )
        .unwrap();
        let report = TreeReport::collect(&ws, &TrackedTrees::All).unwrap();
        assert_eq!(report.years[0].line(), "2021  4.00");
    }

    #[test]
    fn test_nodata_height_is_rendered() {
        let year = YearHeights {
            year: 2022,
            table: "chm_2022_trees".into(),
            heights: Some(vec![Some(3.0), None]),
        };
        assert_eq!(year.line(), "2022  3.00   NoData");
    }
}
