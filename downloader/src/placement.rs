/// Where downloaded lectures live on disk.
use std::path::PathBuf;

use chrono::{Datelike, NaiveDate};
use once_cell::sync::Lazy;
use regex::Regex;

use lectern_shared::models::{Course, Session};

static REPEATED_SPACES: Lazy<Regex> = Lazy::new(|| Regex::new(r" +").unwrap());

static COURSE_NAME_NOISE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r" ?[^a-zA-Z0-9() &]| ?UG & PG| ?Combined| ?\(.*\)").unwrap()
});

/// Maps a session to the directory its artifact is written into.
pub trait Placement: Send + Sync {
    /// Pure and deterministic; does not touch the filesystem.
    fn directory_for(&self, course: &Course, session: &Session) -> PathBuf;
}

/// `<root>/<year>/semester<1|2>/<short course name>`.
#[derive(Debug, Clone)]
pub struct SemesterPlacement {
    root: PathBuf,
}

impl SemesterPlacement {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl Placement for SemesterPlacement {
    fn directory_for(&self, course: &Course, session: &Session) -> PathBuf {
        let mut dir = self.root.clone();
        match NaiveDate::parse_from_str(session.date.trim(), "%d/%m/%y") {
            Ok(date) => {
                dir.push(date.year().to_string());
                dir.push(if date.month() <= 6 { "semester1" } else { "semester2" });
            }
            Err(_) => dir.push("unsorted"),
        }
        dir.push(short_course_name(&course.name));
        dir
    }
}

/// Shortened course name usable as a single directory component.
pub fn short_course_name(name: &str) -> String {
    let collapsed = REPEATED_SPACES.replace_all(name, " ");
    let short = COURSE_NAME_NOISE.replace_all(&collapsed, "");
    let short = short.trim();
    if short.is_empty() {
        "course".to_string()
    } else {
        short.to_string()
    }
}
