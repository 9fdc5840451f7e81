/// Register data model shared across all Lectern crates.
///
/// Field names on the wire follow the register document written by earlier
/// versions of the scraper, so existing `register.json` files load unchanged.
use std::fmt;

use serde::{Deserialize, Serialize};

/// One recorded lecture.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    #[serde(default)]
    pub presenter: String,
    /// `DD/MM/YY`
    pub date: String,
    /// `HH:MM AM`
    pub time: String,
    /// `HH:MM` duration
    pub length: String,
    /// Download URL, empty until resolved.
    #[serde(default)]
    pub link: String,
    #[serde(default)]
    pub notes: String,
    /// Local artifact path, empty until downloaded.
    #[serde(default)]
    pub file: String,
}

impl Session {
    /// Natural identity of this session within its course.
    pub fn key(&self) -> SessionKey {
        SessionKey {
            date: self.date.clone(),
            time: self.time.clone(),
            length: self.length.clone(),
        }
    }

    /// Whether the artifact has already been written locally.
    pub fn is_downloaded(&self) -> bool {
        !self.file.is_empty()
    }

    /// Whether the download reconciler should fetch this session.
    pub fn is_pending(&self) -> bool {
        !self.link.is_empty() && self.file.is_empty()
    }
}

/// Composite `(date, time, length)` identity of a session.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionKey {
    pub date: String,
    pub time: String,
    pub length: String,
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} ({})", self.date, self.time, self.length)
    }
}

/// A course and its recorded sessions, in register order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Course {
    #[serde(rename = "courseName")]
    pub name: String,
    #[serde(rename = "courseCode", default)]
    pub code: String,
    #[serde(rename = "numOfLectures", default)]
    pub expected_sessions: u32,
    #[serde(rename = "courseLectures", alias = "courselectures", default)]
    pub sessions: Vec<Session>,
}

impl Course {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Count of sessions with a local artifact.
    pub fn downloaded_count(&self) -> usize {
        self.sessions.iter().filter(|s| s.is_downloaded()).count()
    }
}

/// The full durable collection of courses.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Register {
    pub courses: Vec<Course>,
}

impl Register {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.courses.is_empty()
    }

    pub fn course(&self, name: &str) -> Option<&Course> {
        self.courses.iter().find(|c| c.name == name)
    }

    /// Total number of sessions across all courses.
    pub fn session_count(&self) -> usize {
        self.courses.iter().map(|c| c.sessions.len()).sum()
    }

    /// Number of sessions eligible for download.
    pub fn pending_count(&self) -> usize {
        self.courses
            .iter()
            .flat_map(|c| c.sessions.iter())
            .filter(|s| s.is_pending())
            .count()
    }
}

// ====== HARVEST OBSERVATIONS ======

/// A course as seen on the portal's course listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CourseListing {
    pub name: String,
    pub code: String,
    pub expected_sessions: u32,
    /// Harvester-specific reference used to load the course's sessions.
    pub sessions_ref: String,
}

/// A raw session row observed during harvesting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionObservation {
    pub presenter: String,
    pub date: String,
    pub time: String,
    pub length: String,
    pub notes: String,
    /// Reference to the session's detail page, used to resolve the link.
    pub detail_ref: String,
}

impl SessionObservation {
    /// Build a register session from this observation.
    pub fn into_session(self, link: String, file: String) -> Session {
        Session {
            presenter: self.presenter,
            date: self.date,
            time: self.time,
            length: self.length,
            link,
            notes: self.notes,
            file,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_deserialization() {
        let json = r#"[{
            "courseName": "Networks 101",
            "courseCode": "COMP 1001",
            "numOfLectures": 2,
            "courseLectures": [
                {"presenter": "Dr A", "date": "01/03/24", "time": "10:00 AM", "length": "01:00",
                 "link": "http://x/a", "notes": "", "file": "lectures/a.mp4"},
                {"presenter": "Dr A", "date": "08/03/24", "time": "10:00 AM", "length": "00:58",
                 "link": "", "notes": "Guest", "file": ""}
            ]
        }]"#;
        let register: Register = serde_json::from_str(json).unwrap();
        assert_eq!(register.courses.len(), 1);
        let course = register.course("Networks 101").unwrap();
        assert_eq!(course.code, "COMP 1001");
        assert_eq!(course.expected_sessions, 2);
        assert!(course.sessions[0].is_downloaded());
        assert!(!course.sessions[1].is_pending());
        assert_eq!(course.downloaded_count(), 1);
    }

    #[test]
    fn test_legacy_lowercase_sessions_key() {
        let json = r#"[{"courseName": "Old", "courseCode": "X", "numOfLectures": 1,
            "courselectures": [{"presenter": "P", "date": "01/01/17", "time": "9:00 AM",
            "length": "00:50", "link": "http://x/b", "notes": ""}]}]"#;
        let register: Register = serde_json::from_str(json).unwrap();
        let session = &register.courses[0].sessions[0];
        assert_eq!(session.file, "");
        assert!(session.is_pending());
        assert_eq!(register.pending_count(), 1);
    }

    #[test]
    fn test_serialized_field_names() {
        let mut course = Course::new("Networks 101");
        course.sessions.push(Session {
            date: "01/03/24".into(),
            time: "10:00 AM".into(),
            length: "01:00".into(),
            ..Session::default()
        });
        let register = Register { courses: vec![course] };
        let json = serde_json::to_string(&register).unwrap();
        assert!(json.starts_with('['));
        assert!(json.contains("\"courseName\""));
        assert!(json.contains("\"numOfLectures\""));
        assert!(json.contains("\"courseLectures\""));
        assert!(json.contains("\"file\":\"\""));
    }

    #[test]
    fn test_session_key_display() {
        let session = Session {
            date: "01/03/24".into(),
            time: "10:00 AM".into(),
            length: "01:00".into(),
            ..Session::default()
        };
        assert_eq!(session.key().to_string(), "01/03/24 10:00 AM (01:00)");
    }
}
