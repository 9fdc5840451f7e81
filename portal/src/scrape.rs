/// MyMedia page harvesting.
///
/// Three pages are read: the course listing, one sessions table per course,
/// and one detail page per new session (for its MP4 link). Parsing is split
/// from fetching so the parsers can be tested against stored HTML.
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Url;
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, info, warn};

use lectern_shared::auth::AuthSession;
use lectern_shared::errors::HarvestError;
use lectern_shared::harvest::Harvester;
use lectern_shared::models::{CourseListing, SessionObservation};

use crate::html;

static COURSE_SECTION: Lazy<Selector> =
    Lazy::new(|| Selector::parse("div.my_courses_course_section").unwrap());

static COURSE_NAME: Lazy<Selector> = Lazy::new(|| Selector::parse("b > a").unwrap());

static COURSE_CODE: Lazy<Selector> = Lazy::new(|| Selector::parse("span > i").unwrap());

static ROW: Lazy<Selector> = Lazy::new(|| Selector::parse("tr").unwrap());

static FILES_FOR_SESSION: Lazy<Selector> = Lazy::new(|| Selector::parse("#files_for_session").unwrap());

static SESSION_COUNT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\(\s*(\d+)\s+sessions?\s*\)").unwrap());

static DATE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d+/\d+/\d+").unwrap());

static TIME: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d+:\d+ [a-zA-Z]+").unwrap());

/// Harvester for the MyMedia lecture capture portal.
#[derive(Debug, Clone)]
pub struct MyMediaHarvester {
    session: AuthSession,
    media_url: String,
}

impl MyMediaHarvester {
    pub fn new(session: AuthSession, media_url: &str) -> Self {
        Self {
            session,
            media_url: media_url.trim_end_matches('/').to_string(),
        }
    }

    /// GET a page, returning its final URL (after redirects) and body.
    async fn fetch_page(&self, url: &str) -> Result<(Url, String), HarvestError> {
        let request_err = |e: reqwest::Error| HarvestError::Request {
            url: url.to_string(),
            message: e.to_string(),
        };

        debug!("GET {}", url);
        let response = self.session.client().get(url).send().await.map_err(request_err)?;
        let status = response.status();
        if !status.is_success() {
            return Err(HarvestError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        let final_url = response.url().clone();
        let body = response.text().await.map_err(request_err)?;
        Ok((final_url, body))
    }
}

#[async_trait]
impl Harvester for MyMediaHarvester {
    async fn observe_courses(&self) -> Result<Vec<CourseListing>, HarvestError> {
        let url = format!("{}/user/bb_courses", self.media_url);
        let (base, page) = self.fetch_page(&url).await?;

        let mut listings = Vec::new();
        for parsed in parse_course_listings(&base, &page) {
            match parsed {
                Ok(listing) => listings.push(listing),
                Err(e) => warn!("Skipping course block: {}", e),
            }
        }
        info!("{} course(s) listed", listings.len());
        Ok(listings)
    }

    async fn observe_sessions(
        &self,
        course: &CourseListing,
    ) -> Result<Vec<Result<SessionObservation, HarvestError>>, HarvestError> {
        if Url::parse(&course.sessions_ref).is_err() {
            return Err(HarvestError::InvalidReference(course.sessions_ref.clone()));
        }
        let (base, page) = self.fetch_page(&course.sessions_ref).await?;
        Ok(parse_session_rows(&base, &page, &course.name))
    }

    async fn resolve_download_link(&self, detail_ref: &str) -> Result<String, HarvestError> {
        if Url::parse(detail_ref).is_err() {
            return Err(HarvestError::InvalidReference(detail_ref.to_string()));
        }
        let (base, page) = self.fetch_page(detail_ref).await?;
        parse_download_link(&base, &page)
    }
}

/// Course blocks on the listing page. A block without a name or a sessions
/// link is an error entry; the others are unaffected.
pub fn parse_course_listings(base: &Url, page: &str) -> Vec<Result<CourseListing, HarvestError>> {
    let document = Html::parse_document(page);
    let listings = document
        .select(&COURSE_SECTION)
        .enumerate()
        .map(|(i, section)| parse_course_section(base, section, i + 1))
        .collect();
    listings
}

fn parse_course_section(base: &Url, section: ElementRef<'_>, index: usize) -> Result<CourseListing, HarvestError> {
    let name = section
        .select(&COURSE_NAME)
        .next()
        .map(html::text)
        .filter(|n| !n.is_empty())
        .ok_or_else(|| HarvestError::MissingField {
            field: "course name",
            context: format!("course block {}", index),
        })?;

    let code = section.select(&COURSE_CODE).next().map(html::text).unwrap_or_default();

    let expected_sessions = SESSION_COUNT
        .captures(&html::text(section))
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok())
        .unwrap_or(0);

    // The bold anchor is the course page; the sessions link is the other one.
    let href = html::first_href_outside(section, "b").ok_or_else(|| HarvestError::MissingField {
        field: "sessions link",
        context: name.clone(),
    })?;

    Ok(CourseListing {
        name,
        code,
        expected_sessions,
        sessions_ref: resolve(base, &href)?,
    })
}

/// Session rows of a course's sessions table. Header rows (no `<td>`) are
/// ignored; malformed rows become error entries.
pub fn parse_session_rows(base: &Url, page: &str, course: &str) -> Vec<Result<SessionObservation, HarvestError>> {
    let document = Html::parse_document(page);
    let rows = document
        .select(&ROW)
        .map(html::cells)
        .filter(|cells| !cells.is_empty())
        .enumerate()
        .map(|(i, cells)| parse_session_row(base, &cells, &format!("{} row {}", course, i + 1)))
        .collect();
    rows
}

fn parse_session_row(base: &Url, cells: &[ElementRef<'_>], context: &str) -> Result<SessionObservation, HarvestError> {
    let missing = |field: &'static str| HarvestError::MissingField {
        field,
        context: context.to_string(),
    };

    if cells.len() < 4 {
        return Err(missing("session cells"));
    }

    let detail_href = html::first_href(cells[0]).ok_or_else(|| missing("detail link"))?;
    let presenter = html::text(cells[1]);

    let when = html::text(cells[2]);
    let date = DATE.find(&when).ok_or_else(|| missing("date"))?.as_str().to_string();
    let time = TIME.find(&when).ok_or_else(|| missing("time"))?.as_str().to_string();

    let length: String = html::text(cells[3])
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == ':')
        .collect();

    let notes = cells.get(4).map(|c| html::text_without_links(*c)).unwrap_or_default();

    Ok(SessionObservation {
        presenter,
        date,
        time,
        length,
        notes,
        detail_ref: resolve(base, &detail_href)?,
    })
}

/// MP4 link on a session detail page, or empty when the page lists none.
pub fn parse_download_link(base: &Url, page: &str) -> Result<String, HarvestError> {
    let document = Html::parse_document(page);
    let Some(files) = document.select(&FILES_FOR_SESSION).next() else {
        debug!("No files_for_session block on {}", base);
        return Ok(String::new());
    };

    for row in files.select(&ROW) {
        let cells = html::cells(row);
        if !cells.iter().any(|c| html::text(*c) == "MP4") {
            continue;
        }
        if let Some(href) = cells.get(2).and_then(|c| html::first_href(*c)) {
            return resolve(base, &href);
        }
    }
    Ok(String::new())
}

fn resolve(base: &Url, href: &str) -> Result<String, HarvestError> {
    base.join(href)
        .map(|u| u.to_string())
        .map_err(|_| HarvestError::InvalidReference(href.to_string()))
}
