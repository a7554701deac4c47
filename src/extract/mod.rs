//! Heuristic extraction of "similar places" from rendered pages.
//!
//! Best-effort DOM scan, independent of the page cache:
//!
//! 1. find the element whose text carries a "similar" marker phrase and widen
//!    it to its enclosing section (or scan the whole page if there is none)
//! 2. collect links whose href carries an entity id
//! 3. skip the leading promoted slots (`ExtractorConfig::ad_slots`)
//! 4. take a name from the most specific name element, else the first
//!    non-empty text line, and clean it with the profile's ordered rules
//! 5. pick up rating, review count and distance from the link's card
//! 6. deduplicate by id
//!
//! Nothing here fails on page content: a link that does not yield a usable
//! record is skipped, and a missing section yields fewer (or no) records.

pub mod rules;

use std::collections::HashSet;

use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, warn};

use crate::config::ExtractorConfig;
use crate::model::{CompetitorRecord, CompetitorSet, CompetitorSource};
use crate::locator::RankCrawler;
use crate::session::{PageSession, SessionProvider};
use crate::{Error, Result};

pub use rules::{CleaningRule, TextCleaner, LISTING_NAME_RULES, WHITESPACE_RULES};

const SECTION_CANDIDATES: &str = "h2, h3, div, section";
const SECTION_CONTAINER: &str = r#"section, div[class*="section"]"#;
const CARD_CONTAINER: &str = r#"article, li, div[class*="item"], div[class*="card"]"#;
const RATING_SELECTOR: &str = r#"[class*="rating"], [class*="score"], [class*="star"]"#;
const REVIEW_SELECTOR: &str = r#"[class*="review"]"#;
const DISTANCE_SELECTOR: &str = r#"[class*="distance"], [class*="meter"], [class*="km"]"#;
const DISTANCE_PATTERN: &str = r"(\d+(?:\.\d+)?(?:km|m))";
const MAX_NAME_CHARS: usize = 100;

// ============================================================================
// Profiles
// ============================================================================

/// Site-specific knobs for one "similar places" layout.
#[derive(Debug, Clone)]
pub struct SimilarProfile {
    pub source: CompetitorSource,
    pub markers: Vec<String>,
    /// A section whose text contains one of these is not the one we want.
    pub exclude_markers: Vec<String>,
    /// Entity links inside the section.
    pub link_selector: Selector,
    /// Entity links anywhere on the page, used when no section matched.
    pub fallback_link_selector: Selector,
    /// The link's absolute URL must contain this.
    pub href_contains: Option<String>,
    /// First capture group is the entity id.
    pub id_pattern: Regex,
    pub ad_slots: usize,
    /// Elements holding the name, searched inside the link. Earlier
    /// selectors win over later ones regardless of document order.
    pub name_selectors: Vec<Selector>,
    /// Text lines containing one of these are passed over for the name
    /// unless every line does.
    pub skip_lines: Vec<String>,
    pub cleaner: TextCleaner,
    /// Tried in order against the card text; first capture group wins.
    pub distance_patterns: Vec<Regex>,
    pub review_pattern: Regex,
}

impl SimilarProfile {
    /// "Similar restaurants" block on the listing site's detail page.
    pub fn listing(ad_slots: usize) -> Result<Self> {
        let links = selector(r#"a[href*="/restaurant/"], a[href*="/place/"]"#)?;
        Ok(Self {
            source: CompetitorSource::NaverSimilar,
            markers: vec!["비슷한 맛집".into(), "이 장소와".into()],
            exclude_markers: Vec::new(),
            link_selector: links.clone(),
            fallback_link_selector: links,
            href_contains: None,
            id_pattern: regex(r"/(?:restaurant|place)/(\d+)")?,
            ad_slots,
            name_selectors: vec![
                selector(r#"span[class*="place"], span[class*="name"], strong, b"#)?,
                selector("div:first-child span")?,
            ],
            skip_lines: Vec::new(),
            cleaner: TextCleaner::from_rules(LISTING_NAME_RULES)?,
            distance_patterns: vec![regex(DISTANCE_PATTERN)?],
            review_pattern: regex(r"리뷰\s*(\d[\d,]*)")?,
        })
    }

    /// "Similar restaurants" block on the secondary review site.
    pub fn review_site() -> Result<Self> {
        Ok(Self {
            source: CompetitorSource::DiningcodeSimilar,
            markers: vec!["비슷한 맛집".into()],
            exclude_markers: vec!["근처".into()],
            link_selector: selector("a[href]")?,
            fallback_link_selector: selector("a.similar_rest_card[href]")?,
            href_contains: Some("diningcode.com/profile".into()),
            id_pattern: regex(r"rid=([^&]+)")?,
            ad_slots: 0,
            name_selectors: Vec::new(),
            skip_lines: vec!["현 식당".into(), "거리".into()],
            cleaner: TextCleaner::from_rules(WHITESPACE_RULES)?,
            distance_patterns: vec![regex(r"현 식당에서 (\d+(?:\.\d+)?(?:km|m))")?, regex(DISTANCE_PATTERN)?],
            review_pattern: regex(r"리뷰\s*(\d[\d,]*)")?,
        })
    }

    fn is_section_text(&self, text: &str) -> bool {
        self.markers.iter().any(|m| text.contains(m.as_str()))
            && !self.exclude_markers.iter().any(|m| text.contains(m.as_str()))
    }
}

// ============================================================================
// Extraction
// ============================================================================

/// Selectors shared by every profile.
struct DomSelectors {
    section_candidates: Selector,
    section_container: Selector,
    card: Selector,
    rating: Selector,
    review: Selector,
    distance: Selector,
}

impl DomSelectors {
    fn new() -> Result<Self> {
        Ok(Self {
            section_candidates: selector(SECTION_CANDIDATES)?,
            section_container: selector(SECTION_CONTAINER)?,
            card: selector(CARD_CONTAINER)?,
            rating: selector(RATING_SELECTOR)?,
            review: selector(REVIEW_SELECTOR)?,
            distance: selector(DISTANCE_SELECTOR)?,
        })
    }
}

/// Collects competitor records through a [`PageSession`].
pub struct CompetitorCollector {
    config: ExtractorConfig,
    listing: SimilarProfile,
    review_site: SimilarProfile,
    dom: DomSelectors,
}

impl CompetitorCollector {
    pub fn new(config: ExtractorConfig) -> Result<Self> {
        Ok(Self {
            listing: SimilarProfile::listing(config.ad_slots)?,
            review_site: SimilarProfile::review_site()?,
            dom: DomSelectors::new()?,
            config,
        })
    }

    pub fn listing_profile(&self) -> &SimilarProfile {
        &self.listing
    }

    pub fn review_site_profile(&self) -> &SimilarProfile {
        &self.review_site
    }

    /// Similar places from the listing site's detail page of `place_id`.
    /// Never fails; navigation problems are logged and yield an empty list.
    pub async fn collect_listing<S: PageSession>(&self, session: &mut S, place_id: &str) -> Vec<CompetitorRecord> {
        let url = self.config.detail_url.replace("{id}", place_id);
        self.collect(session, &url, &self.listing, Some(place_id)).await
    }

    /// Similar places from a review-site profile page.
    pub async fn collect_review_site<S: PageSession>(&self, session: &mut S, url: &str) -> Vec<CompetitorRecord> {
        self.collect(session, url, &self.review_site, None).await
    }

    /// Both profiles; the review site only when its URL is known.
    pub async fn collect_all<S: PageSession>(
        &self,
        session: &mut S,
        place_id: &str,
        review_site_url: Option<&str>,
    ) -> CompetitorSet {
        let naver = self.collect_listing(session, place_id).await;
        let diningcode = match review_site_url {
            Some(url) => self.collect_review_site(session, url).await,
            None => Vec::new(),
        };
        CompetitorSet { naver, diningcode }
    }

    async fn collect<S: PageSession>(
        &self,
        session: &mut S,
        url: &str,
        profile: &SimilarProfile,
        current_id: Option<&str>,
    ) -> Vec<CompetitorRecord> {
        let html = match self.load(session, url).await {
            Ok(html) => html,
            Err(err) => {
                warn!(url, source = profile.source.as_str(), error = %err, "failed to collect competitors");
                return Vec::new();
            }
        };
        let mut records = self.extract(&html, url, profile, current_id);
        records.truncate(self.config.limit);
        records
    }

    async fn load<S: PageSession>(&self, session: &mut S, url: &str) -> Result<String> {
        let timeout = self.config.timeout;
        tokio::time::timeout(timeout, session.navigate(url, timeout))
            .await
            .map_err(|_| Error::navigation(url, format!("timed out after {timeout:?}")))??;
        session.content().await
    }

    /// Pure scan of `html`, resolved against `page_url`. Unbounded by `limit`.
    pub fn extract(
        &self,
        html: &str,
        page_url: &str,
        profile: &SimilarProfile,
        current_id: Option<&str>,
    ) -> Vec<CompetitorRecord> {
        let document = Html::parse_document(html);
        let base = url::Url::parse(page_url).ok();

        let links: Vec<ElementRef<'_>> = match self.find_section(&document, profile) {
            Some(section) => section.select(&profile.link_selector).collect(),
            None => {
                debug!(source = profile.source.as_str(), "no similar section; scanning whole page");
                document.select(&profile.fallback_link_selector).collect()
            }
        };

        let mut records = Vec::new();
        let mut seen = HashSet::new();
        let mut skipped_ads = 0;

        for link in links {
            let Some(href) = link.value().attr("href") else { continue };
            let href = resolve_href(href, base.as_ref());
            if profile.href_contains.as_deref().is_some_and(|needle| !href.contains(needle)) {
                continue;
            }
            let Some(id) = profile.id_pattern.captures(&href).and_then(|c| c.get(1)) else { continue };
            let id = id.as_str();
            if current_id == Some(id) {
                continue;
            }
            if skipped_ads < profile.ad_slots {
                skipped_ads += 1;
                continue;
            }
            let Some(record) = self.read_card(link, &href, id, profile) else {
                continue;
            };
            if seen.insert(record.place_id.clone()) {
                records.push(record);
            }
        }

        debug!(source = profile.source.as_str(), found = records.len(), "extracted competitors");
        records
    }

    /// Innermost marker element, widened to its section.
    fn find_section<'a>(&self, document: &'a Html, profile: &SimilarProfile) -> Option<ElementRef<'a>> {
        let mut innermost: Option<ElementRef<'a>> = None;
        for el in document.select(&self.dom.section_candidates) {
            if !profile.is_section_text(&normalized_text(el)) {
                continue;
            }
            match innermost {
                Some(current) if el.ancestors().any(|a| a.id() == current.id()) => innermost = Some(el),
                Some(_) => break,
                None => innermost = Some(el),
            }
        }

        let marker = innermost?;
        closest(marker, &self.dom.section_container)
            .or_else(|| marker.parent().and_then(ElementRef::wrap))
    }

    fn read_card(
        &self,
        link: ElementRef<'_>,
        href: &str,
        id: &str,
        profile: &SimilarProfile,
    ) -> Option<CompetitorRecord> {
        let raw_name = profile
            .name_selectors
            .iter()
            .filter_map(|sel| link.select(sel).next())
            .map(|el| el.text().collect::<String>())
            .find(|t| !t.trim().is_empty())
            .or_else(|| first_line(link, &profile.skip_lines))?;

        let name = profile.cleaner.clean(&raw_name);
        if name.is_empty() || name.chars().count() >= MAX_NAME_CHARS {
            return None;
        }

        let card = closest(link, &self.dom.card).unwrap_or(link);
        let card_text = card.text().collect::<Vec<_>>().join(" ");

        let rating = card
            .select(&self.dom.rating)
            .next()
            .map(|el| el.text().collect::<String>().trim().to_owned())
            .unwrap_or_default();

        let review_count = card
            .select(&self.dom.review)
            .next()
            .map(|el| el.text().collect::<String>())
            .and_then(|t| capture(&profile.review_pattern, &t))
            .map(|n| n.replace(',', ""))
            .unwrap_or_default();

        let distance = card
            .select(&self.dom.distance)
            .next()
            .map(|el| el.text().collect::<String>().trim().to_owned())
            .filter(|d| !d.is_empty())
            .or_else(|| profile.distance_patterns.iter().find_map(|p| capture(p, &card_text)))
            .unwrap_or_default();

        Some(CompetitorRecord {
            place_id: id.to_owned(),
            name,
            category: String::new(),
            rating,
            review_count,
            distance,
            url: href.split('?').next().unwrap_or_default().to_owned(),
            source: profile.source,
        })
    }
}

impl<P: SessionProvider> RankCrawler<P> {
    /// Competitors of `place_id` collected in one fresh session.
    pub async fn collect_competitors(
        &self,
        place_id: &str,
        review_site_url: Option<&str>,
    ) -> Result<CompetitorSet> {
        let collector = CompetitorCollector::new(self.config().extractor.clone())?;
        let mut session = self.provider().open().await?;
        let set = collector.collect_all(&mut session, place_id, review_site_url).await;
        session.close().await;
        Ok(set)
    }
}

// ============================================================================
// DOM helpers
// ============================================================================

fn selector(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|e| Error::Config(format!("invalid selector {css:?}: {e:?}")))
}

fn regex(pattern: &str) -> Result<Regex> {
    Regex::new(pattern).map_err(|e| Error::Config(format!("invalid pattern {pattern:?}: {e}")))
}

fn closest<'a>(el: ElementRef<'a>, sel: &Selector) -> Option<ElementRef<'a>> {
    el.ancestors().filter_map(ElementRef::wrap).find(|a| sel.matches(a))
}

fn normalized_text(el: ElementRef<'_>) -> String {
    el.text().flat_map(str::split_whitespace).collect::<Vec<_>>().join(" ")
}

/// First non-empty text line under `el` that contains none of `skip`, else
/// the first non-empty line.
fn first_line(el: ElementRef<'_>, skip: &[String]) -> Option<String> {
    let lines: Vec<&str> = el
        .text()
        .flat_map(str::lines)
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect();
    lines
        .iter()
        .find(|l| !skip.iter().any(|s| l.contains(s.as_str())))
        .or_else(|| lines.first())
        .map(|l| (*l).to_owned())
}

fn capture(pattern: &Regex, text: &str) -> Option<String> {
    pattern.captures(text).and_then(|c| c.get(1)).map(|m| m.as_str().to_owned())
}

/// `href` made absolute against the page URL, as a browser reports it.
fn resolve_href(href: &str, base: Option<&url::Url>) -> String {
    base.and_then(|b| b.join(href).ok())
        .map(String::from)
        .unwrap_or_else(|| href.to_owned())
}
