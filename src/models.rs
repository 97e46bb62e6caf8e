use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::{collections::BTreeMap, fmt, str::FromStr};
use uuid::Uuid;

/// Sliding-window cap on recorded view durations per advertisement.
pub const MAX_VIEW_DURATIONS: usize = 1000;

// ── Enumerations ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AdType {
    Banner,
    Popup,
    Sidebar,
    Featured,
    Video,
    Carousel,
}

impl AdType {
    pub const ALL: [AdType; 6] = [
        AdType::Banner,
        AdType::Popup,
        AdType::Sidebar,
        AdType::Featured,
        AdType::Video,
        AdType::Carousel,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AdType::Banner => "banner",
            AdType::Popup => "popup",
            AdType::Sidebar => "sidebar",
            AdType::Featured => "featured",
            AdType::Video => "video",
            AdType::Carousel => "carousel",
        }
    }
}

impl FromStr for AdType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AdType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| format!("unknown advertisement type '{s}'"))
    }
}

impl fmt::Display for AdType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AdStatus {
    Draft,
    Scheduled,
    Active,
    Paused,
    Completed,
    Archived,
}

impl AdStatus {
    pub const ALL: [AdStatus; 6] = [
        AdStatus::Draft,
        AdStatus::Scheduled,
        AdStatus::Active,
        AdStatus::Paused,
        AdStatus::Completed,
        AdStatus::Archived,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AdStatus::Draft => "draft",
            AdStatus::Scheduled => "scheduled",
            AdStatus::Active => "active",
            AdStatus::Paused => "paused",
            AdStatus::Completed => "completed",
            AdStatus::Archived => "archived",
        }
    }
}

impl FromStr for AdStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AdStatus::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| format!("unknown advertisement status '{s}'"))
    }
}

impl fmt::Display for AdStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How an advertisement competes for its slot once it is eligible.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RotationStrategy {
    Fixed,
    Random,
    Balanced,
    #[default]
    Sequential,
    Time,
}

impl RotationStrategy {
    /// Group precedence used by the selector: the first non-empty group wins.
    pub const PRECEDENCE: [RotationStrategy; 5] = [
        RotationStrategy::Fixed,
        RotationStrategy::Random,
        RotationStrategy::Balanced,
        RotationStrategy::Sequential,
        RotationStrategy::Time,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RotationStrategy::Fixed => "fixed",
            RotationStrategy::Random => "random",
            RotationStrategy::Balanced => "balanced",
            RotationStrategy::Sequential => "sequential",
            RotationStrategy::Time => "time",
        }
    }
}

impl FromStr for RotationStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RotationStrategy::PRECEDENCE
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| format!("unknown rotation strategy '{s}'"))
    }
}

/// Query-string field helper: a missing, empty or blank value is `None`,
/// anything else must parse.
pub fn empty_as_none<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: FromStr,
    T::Err: fmt::Display,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    match raw.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        Some(value) => value.parse().map(Some).map_err(serde::de::Error::custom),
        None => Ok(None),
    }
}

// ── Nested document parts ──────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Content {
    pub title: Option<String>,
    pub subtitle: Option<String>,
    pub description: Option<String>,
    pub cta_text: Option<String>,
    pub cta_link: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RotationSettings {
    pub strategy: RotationStrategy,
    /// How many impressions in a row the ad keeps before rotating; informational.
    pub frequency: Option<u32>,
    pub rotation_group: Option<String>,
    pub rotation_priority: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Budget {
    pub total: f64,
    pub spent: f64,
    pub currency: String,
}

impl Default for Budget {
    fn default() -> Self {
        Self {
            total: 0.0,
            spent: 0.0,
            currency: "USD".to_owned(),
        }
    }
}

/// Counters for one calendar day (UTC).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyStat {
    pub date: NaiveDate,
    #[serde(default)]
    pub impressions: i64,
    #[serde(default)]
    pub clicks: i64,
    #[serde(default)]
    pub conversions: i64,
}

impl DailyStat {
    pub fn empty(date: NaiveDate) -> Self {
        Self {
            date,
            impressions: 0,
            clicks: 0,
            conversions: 0,
        }
    }
}

/// Counters kept per key of a breakdown map (device, position, page, ...).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DimensionStats {
    pub impressions: i64,
    pub clicks: i64,
    pub conversions: i64,
}

pub type Breakdown = BTreeMap<String, DimensionStats>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewDuration {
    /// Milliseconds the advertisement stayed in view.
    pub duration: f64,
    #[serde(default)]
    pub viewport_size: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

// ── Advertisement ──────────────────────────────────────────────────────────

/// The advertisement document as stored and served.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Advertisement {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub ad_type: AdType,
    pub position: String,
    pub content: Content,
    pub image_url: Option<String>,
    pub video_url: Option<String>,
    pub link_url: Option<String>,

    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub is_active: bool,
    pub status: AdStatus,

    pub target_device: Vec<String>,
    pub target_context: Vec<String>,
    pub keywords: Vec<String>,
    pub target_audience: Option<String>,

    pub rotation_settings: RotationSettings,
    pub priority: i32,
    pub last_impression: Option<DateTime<Utc>>,

    pub impressions: i64,
    pub clicks: i64,
    pub conversions: i64,
    pub ctr: f64,
    pub daily_stats: Vec<DailyStat>,
    pub devices: Breakdown,
    pub positions: Breakdown,
    pub pages: Breakdown,
    pub contexts: Breakdown,
    pub keyword_stats: Breakdown,
    pub rotation_groups: Breakdown,
    pub view_durations: Vec<ViewDuration>,
    pub relevance_score: f64,
    /// Number of contextual events folded into `relevance_score`.
    pub relevance_samples: i64,

    pub budget: Budget,
    pub client: Option<String>,
    pub created_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Advertisement {
    /// Build a fresh document from admin input with zeroed analytics.
    pub fn new(input: AdvertisementInput, now: DateTime<Utc>) -> Self {
        let mut ad = Self {
            id: Uuid::new_v4().to_string(),
            name: String::new(),
            ad_type: input.ad_type,
            position: String::new(),
            content: Content::default(),
            image_url: None,
            video_url: None,
            link_url: None,
            start_date: input.start_date,
            end_date: input.end_date,
            is_active: true,
            status: AdStatus::Draft,
            target_device: Vec::new(),
            target_context: Vec::new(),
            keywords: Vec::new(),
            target_audience: None,
            rotation_settings: RotationSettings::default(),
            priority: 0,
            last_impression: None,
            impressions: 0,
            clicks: 0,
            conversions: 0,
            ctr: 0.0,
            daily_stats: Vec::new(),
            devices: Breakdown::new(),
            positions: Breakdown::new(),
            pages: Breakdown::new(),
            contexts: Breakdown::new(),
            keyword_stats: Breakdown::new(),
            rotation_groups: Breakdown::new(),
            view_durations: Vec::new(),
            relevance_score: 0.0,
            relevance_samples: 0,
            budget: Budget::default(),
            client: None,
            created_by: None,
            created_at: now,
            updated_at: now,
        };
        ad.apply_input(input);
        ad.refresh_derived(now);
        ad
    }

    /// Overwrite every admin-editable field; analytics are left alone.
    pub fn apply_input(&mut self, input: AdvertisementInput) {
        self.name = input.name.trim().to_owned();
        self.ad_type = input.ad_type;
        self.position = input.position.trim().to_owned();
        self.content = input.content;
        self.image_url = input.image_url;
        self.video_url = input.video_url;
        self.link_url = input.link_url;
        self.start_date = input.start_date;
        self.end_date = input.end_date;
        self.is_active = input.is_active;
        self.target_device = input.target_device;
        self.target_context = input.target_context;
        self.keywords = input.keywords;
        self.target_audience = input.target_audience;
        self.rotation_settings = input.rotation_settings;
        self.priority = input.priority;
        self.budget = input.budget;
        if input.client.is_some() {
            self.client = input.client;
        }
        if input.created_by.is_some() {
            self.created_by = input.created_by;
        }
    }

    /// Recompute every derived field. Called before each persist.
    pub fn refresh_derived(&mut self, now: DateTime<Utc>) {
        self.status = derive_status(self.is_active, self.start_date, self.end_date, now);
        self.recompute_ctr();
        self.updated_at = now;
    }

    pub fn recompute_ctr(&mut self) {
        self.ctr = click_through_rate(self.clicks, self.impressions);
    }

    /// Active flag set and `now` inside the scheduling window (inclusive).
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.is_active && self.start_date <= now && now <= self.end_date
    }

    /// Empty `targetContext` means the ad is open to every context.
    pub fn matches_context(&self, context: &str) -> bool {
        self.target_context.is_empty() || self.target_context.iter().any(|c| c == context)
    }

    pub fn matches_device(&self, device: &str) -> bool {
        self.target_device.is_empty() || self.target_device.iter().any(|d| d == device)
    }

    pub fn rotation_group(&self) -> Option<&str> {
        self.rotation_settings.rotation_group.as_deref()
    }
}

/// Status as a pure function of the activation flag and scheduling window.
pub fn derive_status(
    is_active: bool,
    start_date: DateTime<Utc>,
    end_date: DateTime<Utc>,
    now: DateTime<Utc>,
) -> AdStatus {
    if !is_active {
        AdStatus::Paused
    } else if now < start_date {
        AdStatus::Scheduled
    } else if now > end_date {
        AdStatus::Completed
    } else {
        AdStatus::Active
    }
}

/// clicks / impressions, 0 when there are no impressions.
pub fn click_through_rate(clicks: i64, impressions: i64) -> f64 {
    if impressions > 0 {
        clicks as f64 / impressions as f64
    } else {
        0.0
    }
}

// ── Admin input ────────────────────────────────────────────────────────────

/// Body of create/update requests. Analytics fields are never accepted here.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdvertisementInput {
    pub name: String,
    #[serde(rename = "type")]
    pub ad_type: AdType,
    pub position: String,
    #[serde(default)]
    pub content: Content,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub video_url: Option<String>,
    #[serde(default)]
    pub link_url: Option<String>,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default)]
    pub target_device: Vec<String>,
    #[serde(default)]
    pub target_context: Vec<String>,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub target_audience: Option<String>,
    #[serde(default)]
    pub rotation_settings: RotationSettings,
    #[serde(default)]
    pub priority: i32,
    #[serde(default)]
    pub budget: Budget,
    #[serde(default)]
    pub client: Option<String>,
    #[serde(default)]
    pub created_by: Option<String>,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("Advertisement name is required")]
    MissingName,
    #[error("Advertisement position is required")]
    MissingPosition,
    #[error("endDate must be after startDate")]
    EmptyWindow,
    #[error("priority must be between 0 and 100, got {0}")]
    PriorityOutOfRange(i32),
}

impl AdvertisementInput {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.name.trim().is_empty() {
            return Err(ValidationError::MissingName);
        }
        if self.position.trim().is_empty() {
            return Err(ValidationError::MissingPosition);
        }
        if self.end_date <= self.start_date {
            return Err(ValidationError::EmptyWindow);
        }
        if !(0..=100).contains(&self.priority) {
            return Err(ValidationError::PriorityOutOfRange(self.priority));
        }
        Ok(())
    }
}
