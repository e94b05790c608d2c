use std::sync::{Arc, LazyLock};

use chrono::Utc;
use regex::Regex;
use serde::{Deserialize, Serialize};
use sql_connection::SqlConnect;
use tracing::{instrument, warn};
use utoipa::ToSchema;

use crate::history::{
    HISTORY_WINDOW, IdentifierKind, PostgresReputationStore,
    ReputationStore,
};

/// Score at or above which a submission is classified spam
pub const SPAM_THRESHOLD: i32 = 50;

const KEYWORD_SCORE: i32 = 20;
const URL_SCORE_PER_LINK: i32 = 10;
const URL_COUNT_TRIGGER: usize = 3;
const FLAGGED_IP_SCORE: i32 = 30;
const FLAGGED_EMAIL_SCORE: i32 = 25;
const DISPOSABLE_DOMAIN_SCORE: i32 = 40;
const SHORT_CONTACT_SCORE: i32 = 15;
const OFF_TOPIC_BOOKING_SCORE: i32 = 10;

const SHORT_CONTACT_CHARS: usize = 15;
const FLAGGED_IP_MIN_HITS: usize = 3;
const FLAGGED_EMAIL_MIN_HITS: usize = 2;

const SPAM_KEYWORDS: &[&str] = &[
    "viagra",
    "casino",
    "lottery",
    "crypto investment",
    "free money",
    "seo service",
    "buy followers",
    "work from home",
    "cheap pills",
    "guaranteed winner",
];

const DISPOSABLE_DOMAINS: &[&str] = &[
    "mailinator.com",
    "guerrillamail.com",
    "10minutemail.com",
    "tempmail.com",
    "sharklasers.com",
    "yopmail.com",
    "trashmail.com",
];

static URL_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"https?://[^\s]+").expect("url pattern is valid")
});

#[derive(Copy, Clone, Debug, PartialEq, Eq, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionKind {
    Contact,
    Booking,
    Message,
}

#[derive(Clone, Debug, Deserialize)]
pub struct SpamCheckRequest {
    pub text: String,
    pub kind: SubmissionKind,
    pub ip: Option<String>,
    pub email: Option<String>,
}

/// Additive score plus the rules that fired. Deterministic for the
/// same inputs and history; never mutated after the check.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SpamCheckResult {
    pub score: i32,
    pub is_spam: bool,
    pub reasons: Vec<String>,
}

impl SpamCheckResult {
    pub fn reason_summary(&self) -> String { self.reasons.join("; ") }
}

pub struct SpamChecker {
    history: Arc<dyn ReputationStore>,
}

impl SpamChecker {
    pub fn new(history: Arc<dyn ReputationStore>) -> Self {
        Self { history }
    }

    pub fn postgres(db: SqlConnect) -> Self {
        Self::new(Arc::new(PostgresReputationStore::new(db)))
    }

    /// Runs every heuristic and records the outcome for future
    /// reputation lookups. A failed lookup skips that heuristic; the
    /// text rules still apply.
    #[instrument(skip_all)]
    pub async fn check(
        &self, request: &SpamCheckRequest,
    ) -> SpamCheckResult {
        let mut score = 0;
        let mut reasons = Vec::new();

        score += score_text(&request.text, request.kind, &mut reasons);

        if let Some(email) = &request.email {
            if let Some(domain) = disposable_domain(email) {
                score += DISPOSABLE_DOMAIN_SCORE;
                reasons.push(format!("disposable email domain ({domain})"));
            }
            if self
                .flagged(IdentifierKind::Email, email, FLAGGED_EMAIL_MIN_HITS)
                .await
            {
                score += FLAGGED_EMAIL_SCORE;
                reasons.push(
                    "email recently flagged as spam".to_string(),
                );
            }
        }

        if let Some(ip) = &request.ip {
            if self
                .flagged(IdentifierKind::Ip, ip, FLAGGED_IP_MIN_HITS)
                .await
            {
                score += FLAGGED_IP_SCORE;
                reasons.push("ip recently flagged as spam".to_string());
            }
        }

        let result = SpamCheckResult {
            score,
            is_spam: score >= SPAM_THRESHOLD,
            reasons,
        };

        self.record_outcome(request, result.is_spam).await;

        result
    }

    async fn flagged(
        &self, kind: IdentifierKind, identifier: &str, min_hits: usize,
    ) -> bool {
        match self
            .history
            .recent(kind, identifier, HISTORY_WINDOW)
            .await
        {
            Ok(records) => {
                records.iter().filter(|r| r.is_spam).count() >= min_hits
            }
            Err(e) => {
                warn!(
                    kind = kind.as_str(),
                    error = %e,
                    "reputation lookup failed, skipping heuristic"
                );
                false
            }
        }
    }

    /// Best effort: a write failure loses one history data point, not
    /// the check itself.
    async fn record_outcome(
        &self, request: &SpamCheckRequest, is_spam: bool,
    ) {
        let now = Utc::now();
        if let Some(ip) = &request.ip {
            if let Err(e) = self
                .history
                .record(IdentifierKind::Ip, ip, is_spam, now)
                .await
            {
                warn!(error = %e, "failed to record ip reputation");
            }
        }
        if let Some(email) = &request.email {
            if let Err(e) = self
                .history
                .record(IdentifierKind::Email, email, is_spam, now)
                .await
            {
                warn!(error = %e, "failed to record email reputation");
            }
        }
    }
}

/// The pure, synchronous part of the score: keyword, URL density and
/// type-specific rules.
fn score_text(
    text: &str, kind: SubmissionKind, reasons: &mut Vec<String>,
) -> i32 {
    let mut score = 0;
    let lowered = text.to_lowercase();

    for keyword in SPAM_KEYWORDS {
        if lowered.contains(keyword) {
            score += KEYWORD_SCORE;
            reasons.push(format!("keyword match ({keyword})"));
        }
    }

    let url_count = URL_PATTERN.find_iter(text).count();
    if url_count > URL_COUNT_TRIGGER {
        score += URL_SCORE_PER_LINK * url_count as i32;
        reasons.push(format!("excessive links ({url_count})"));
    }

    match kind {
        SubmissionKind::Contact => {
            if text.trim().chars().count() < SHORT_CONTACT_CHARS {
                score += SHORT_CONTACT_SCORE;
                reasons.push("contact message too short".to_string());
            }
        }
        SubmissionKind::Booking => {
            if !lowered.contains("tattoo") {
                score += OFF_TOPIC_BOOKING_SCORE;
                reasons.push(
                    "booking message does not mention tattoo".to_string(),
                );
            }
        }
        SubmissionKind::Message => {}
    }

    score
}

fn disposable_domain(email: &str) -> Option<&'static str> {
    let domain = email.rsplit_once('@')?.1.to_lowercase();
    DISPOSABLE_DOMAINS
        .iter()
        .find(|candidate| **candidate == domain)
        .copied()
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use chrono::{DateTime, Duration};

    use super::*;
    use crate::history::{
        InMemoryReputationStore, ReputationRecord, ReputationStoreError,
    };

    fn checker_with_store(
        store: Arc<InMemoryReputationStore>,
    ) -> SpamChecker {
        SpamChecker::new(store)
    }

    fn request(text: &str, kind: SubmissionKind) -> SpamCheckRequest {
        SpamCheckRequest {
            text: text.to_string(),
            kind,
            ip: None,
            email: None,
        }
    }

    #[tokio::test]
    async fn test_keyword_and_url_density_scenario() {
        let checker =
            checker_with_store(Arc::new(InMemoryReputationStore::new()));

        let result = checker
            .check(&request(
                "Buy cheap viagra now http://a.com http://b.com \
                 http://c.com http://d.com",
                SubmissionKind::Contact,
            ))
            .await;

        assert_eq!(result.score, 60);
        assert!(result.is_spam);
        assert_eq!(result.reasons.len(), 2);
        assert!(result.reasons[0].contains("viagra"));
        assert!(result.reasons[1].contains("4"));
    }

    #[tokio::test]
    async fn test_clean_booking_message_scores_zero() {
        let checker =
            checker_with_store(Arc::new(InMemoryReputationStore::new()));

        let result = checker
            .check(&request(
                "I'd like a tattoo consultation please",
                SubmissionKind::Booking,
            ))
            .await;

        assert_eq!(result.score, 0);
        assert!(!result.is_spam);
        assert!(result.reasons.is_empty());
        assert_eq!(result.reason_summary(), "");
    }

    #[tokio::test]
    async fn test_three_urls_do_not_trigger_density_rule() {
        let checker =
            checker_with_store(Arc::new(InMemoryReputationStore::new()));

        let result = checker
            .check(&request(
                "my portfolio http://a.com http://b.com http://c.com and \
                 a bit of text",
                SubmissionKind::Message,
            ))
            .await;

        assert_eq!(result.score, 0);
    }

    #[tokio::test]
    async fn test_score_is_monotone_in_triggered_rules() {
        let checker =
            checker_with_store(Arc::new(InMemoryReputationStore::new()));

        let keyword_only = checker
            .check(&request(
                "viagra special offer for you today",
                SubmissionKind::Message,
            ))
            .await;
        let keyword_and_urls = checker
            .check(&request(
                "viagra special offer http://a.com http://b.com \
                 http://c.com http://d.com",
                SubmissionKind::Message,
            ))
            .await;

        assert!(keyword_and_urls.score > keyword_only.score);
        assert!(
            keyword_and_urls.reasons.len() > keyword_only.reasons.len()
        );
    }

    #[tokio::test]
    async fn test_short_contact_and_booking_rules() {
        let checker =
            checker_with_store(Arc::new(InMemoryReputationStore::new()));

        let short = checker
            .check(&request("hi there", SubmissionKind::Contact))
            .await;
        assert_eq!(short.score, 15);

        let off_topic = checker
            .check(&request(
                "can I come by on saturday afternoon",
                SubmissionKind::Booking,
            ))
            .await;
        assert_eq!(off_topic.score, 10);
    }

    #[tokio::test]
    async fn test_disposable_domain_plus_booking_reaches_threshold() {
        let checker =
            checker_with_store(Arc::new(InMemoryReputationStore::new()));

        let mut req = request(
            "looking forward to the appointment",
            SubmissionKind::Booking,
        );
        req.email = Some("someone@mailinator.com".to_string());
        let result = checker.check(&req).await;

        assert_eq!(result.score, 50);
        assert!(result.is_spam);
    }

    async fn seed(
        store: &InMemoryReputationStore, kind: IdentifierKind, id: &str,
        outcomes: &[bool],
    ) {
        let base: DateTime<Utc> =
            "2026-08-06T10:00:00Z".parse().unwrap();
        for (i, is_spam) in outcomes.iter().enumerate() {
            store
                .record(
                    kind,
                    id,
                    *is_spam,
                    base + Duration::seconds(i as i64),
                )
                .await
                .unwrap();
        }
    }

    #[tokio::test]
    async fn test_flagged_ip_history_adds_thirty() {
        let store = Arc::new(InMemoryReputationStore::new());
        seed(
            &store,
            IdentifierKind::Ip,
            "203.0.113.9",
            &[true, true, true, false, false],
        )
        .await;
        let checker = checker_with_store(store);

        let mut req = request(
            "I want a tattoo of a swallow",
            SubmissionKind::Booking,
        );
        req.ip = Some("203.0.113.9".to_string());
        let result = checker.check(&req).await;

        assert_eq!(result.score, 30);
        assert!(!result.is_spam);
    }

    #[tokio::test]
    async fn test_flagged_email_history_adds_twenty_five() {
        let store = Arc::new(InMemoryReputationStore::new());
        seed(
            &store,
            IdentifierKind::Email,
            "bot@example.com",
            &[true, false, true, false, false],
        )
        .await;
        let checker = checker_with_store(store);

        let mut req = request(
            "I want a tattoo of a swallow",
            SubmissionKind::Booking,
        );
        req.email = Some("bot@example.com".to_string());
        let result = checker.check(&req).await;

        assert_eq!(result.score, 25);
    }

    #[tokio::test]
    async fn test_history_window_only_counts_last_five() {
        let store = Arc::new(InMemoryReputationStore::new());
        // Three old spam outcomes pushed out of the window by five
        // clean ones
        seed(
            &store,
            IdentifierKind::Ip,
            "203.0.113.7",
            &[true, true, true, false, false, false, false, false],
        )
        .await;
        let checker = checker_with_store(store);

        let mut req = request(
            "I want a tattoo of a swallow",
            SubmissionKind::Booking,
        );
        req.ip = Some("203.0.113.7".to_string());
        let result = checker.check(&req).await;

        assert_eq!(result.score, 0);
    }

    #[tokio::test]
    async fn test_outcomes_are_recorded_for_both_identifiers() {
        let store = Arc::new(InMemoryReputationStore::new());
        let checker = checker_with_store(store.clone());

        let mut req = request("hi", SubmissionKind::Contact);
        req.ip = Some("203.0.113.1".to_string());
        req.email = Some("new@example.com".to_string());
        checker.check(&req).await;

        let by_ip = store
            .recent(IdentifierKind::Ip, "203.0.113.1", HISTORY_WINDOW)
            .await
            .unwrap();
        let by_email = store
            .recent(IdentifierKind::Email, "new@example.com", HISTORY_WINDOW)
            .await
            .unwrap();
        assert_eq!(by_ip.len(), 1);
        assert_eq!(by_email.len(), 1);
        assert!(!by_ip[0].is_spam);
    }

    struct FailingStore;

    #[async_trait]
    impl ReputationStore for FailingStore {
        async fn recent(
            &self, _kind: IdentifierKind, _identifier: &str, _limit: i64,
        ) -> Result<Vec<ReputationRecord>, ReputationStoreError> {
            Err(ReputationStoreError::Connection(
                "pool exhausted".to_string(),
            ))
        }

        async fn record(
            &self, _kind: IdentifierKind, _identifier: &str,
            _is_spam: bool, _checked_at: DateTime<Utc>,
        ) -> Result<(), ReputationStoreError> {
            Err(ReputationStoreError::Connection(
                "pool exhausted".to_string(),
            ))
        }
    }

    #[tokio::test]
    async fn test_lookup_failure_skips_history_heuristics() {
        let checker = SpamChecker::new(Arc::new(FailingStore));

        let mut req = request(
            "Buy cheap viagra now http://a.com http://b.com http://c.com \
             http://d.com",
            SubmissionKind::Contact,
        );
        req.ip = Some("203.0.113.2".to_string());
        req.email = Some("x@example.com".to_string());
        let result = checker.check(&req).await;

        // Text rules still fire; history contributes nothing
        assert_eq!(result.score, 60);
        assert!(result.is_spam);
    }
}
