//! API endpoint paths
//!
//! The catalog of consumed endpoints is fixed at build time. Paths are relative
//! to the configured base URL; token refresh goes to the identity provider's own
//! URL (see [`crate::config::ExportConfig::refresh_url`]).

/// Paths of every endpoint the exporter calls
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiEndpoints {
    /// Session login (POST, email + password)
    pub login: &'static str,
    /// Account profile
    pub profile: &'static str,
    /// Account settings
    pub settings: &'static str,
    /// Lab results list
    pub lab_results: &'static str,
    /// Biomarker catalog
    pub biomarkers: &'static str,
    /// Biomarker category catalog
    pub categories: &'static str,
    /// Recommendations
    pub recommendations: &'static str,
    /// Composite results report
    pub results_report: &'static str,
    /// Biological age calculation
    pub biological_age: &'static str,
    /// BMI calculation, optionally with `requisitionId`
    pub bmi: &'static str,
    /// Notes
    pub notes: &'static str,
    /// Notifications
    pub notifications: &'static str,
    /// Saved payment cards
    pub payment_cards: &'static str,
    /// Referral / invite codes
    pub referral_codes: &'static str,
    /// Lab requisitions, queried with `pending=true` and `pending=false`
    pub requisitions: &'static str,
    /// Pending schedules
    pub pending_schedules: &'static str,
    /// Smart add-ons
    pub smart_add_ons: &'static str,
    /// Narrative story
    pub story: &'static str,
    /// Biomarker detail metadata
    pub biomarker_data: &'static str,
    /// Per-biomarker detail record, suffixed with `/{detail id}`
    pub biomarker_detail: &'static str,
}

/// Endpoints of the production API
pub const DEFAULT_ENDPOINTS: ApiEndpoints = ApiEndpoints {
    login: "/login",
    profile: "/user",
    settings: "/user/settings",
    lab_results: "/results",
    biomarkers: "/biomarkers",
    categories: "/categories",
    recommendations: "/recommendations",
    results_report: "/results-report",
    biological_age: "/biological-calculations/biological-age",
    bmi: "/biological-calculations/bmi",
    notes: "/notes",
    notifications: "/notifications",
    payment_cards: "/payment/cards",
    referral_codes: "/user/invite-codes",
    requisitions: "/requisitions",
    pending_schedules: "/pending-schedules",
    smart_add_ons: "/smart-add-ons",
    story: "/user/story",
    biomarker_data: "/biomarker-data",
    biomarker_detail: "/biomarker-details",
};

impl ApiEndpoints {
    /// Path of the detail record for one sex-scoped variant
    pub fn biomarker_detail_path(&self, detail_id: &str) -> String {
        format!("{}/{}", self.biomarker_detail.trim_end_matches('/'), detail_id)
    }
}

impl Default for ApiEndpoints {
    fn default() -> Self {
        DEFAULT_ENDPOINTS
    }
}
