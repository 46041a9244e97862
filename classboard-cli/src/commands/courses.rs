//! `classboard courses` — list active courses to pick a term from.

use anyhow::{Context as _, Result};
use clap::Args;
use tabled::{settings::Style, Table, Tabled};

use crate::canvas::Course;
use crate::context::Context;

#[derive(Args, Debug)]
pub struct CoursesArgs {
    /// Only courses in this enrollment term.
    #[arg(long, value_name = "TERM_ID")]
    pub term: Option<String>,
}

#[derive(Tabled)]
struct CourseRow {
    id: String,
    term: String,
    name: String,
    start: String,
    end: String,
}

impl CoursesArgs {
    pub fn run(self) -> Result<()> {
        let ctx = Context::load()?;
        let courses = ctx
            .canvas()
            .active_courses(self.term.as_deref())
            .context("failed to list Canvas courses")?;
        if courses.is_empty() {
            println!("No active courses.");
            return Ok(());
        }

        let suggested = suggested_term(&courses);
        let rows: Vec<CourseRow> = courses
            .iter()
            .map(|c| CourseRow {
                id: c.id.to_string(),
                term: c.enrollment_term_id.map_or("-".to_string(), |t| t.to_string()),
                name: c.display_name(),
                start: date_or_dash(c.start_at.as_deref()),
                end: date_or_dash(c.end_at.as_deref()),
            })
            .collect();
        let mut table = Table::new(rows);
        table.with(Style::rounded());
        println!("{table}");

        if let Some(term) = suggested {
            println!("Suggested canvas.term_id: {term}");
        }
        Ok(())
    }
}

/// The newest enrollment term among the listed courses.
fn suggested_term(courses: &[Course]) -> Option<u64> {
    courses.iter().filter_map(|c| c.enrollment_term_id).max()
}

fn date_or_dash(value: Option<&str>) -> String {
    value
        .and_then(|v| v.get(..10))
        .unwrap_or("-")
        .to_string()
}
