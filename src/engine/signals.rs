//! Static heuristic tables and pure signal functions.
//!
//! All keyword, date, and service-mail detection is table-driven: constant
//! string lists plus small pure functions over lowercased text. No regex,
//! no hidden state, deterministic for a given input.

use crate::config::ScoreWeights;
use crate::domain::ChunkSignals;

/// Keywords that mark a passage as high-priority.
const PRIORITY_KEYWORDS: &[&str] = &[
    // English
    "urgent",
    "asap",
    "deadline",
    "action required",
    "please review",
    "blocker",
    "blocked",
    "approval",
    "sign off",
    "escalat",
    "critical",
    "reminder",
    // German
    "dringend",
    "wichtig",
    "frist",
    "freigabe",
    // French
    "urgence",
    "important",
    "validation",
    // Russian
    "срочно",
    "важно",
    "дедлайн",
    "согласован",
];

/// Words and phrases that indicate a date or deadline mention.
const DATE_WORDS: &[&str] = &[
    "today",
    "tomorrow",
    "tonight",
    "eod",
    "cob",
    "end of day",
    "end of week",
    "next week",
    "by friday",
    "by monday",
    "by tuesday",
    "by wednesday",
    "by thursday",
    "due",
    "no later than",
    "monday",
    "tuesday",
    "wednesday",
    "thursday",
    "friday",
    "saturday",
    "sunday",
    "january",
    "february",
    "march",
    "april",
    "june",
    "july",
    "august",
    "september",
    "october",
    "november",
    "december",
    // German
    "montag",
    "dienstag",
    "mittwoch",
    "donnerstag",
    "freitag",
    "bis zum",
    "spätestens",
    // French
    "lundi",
    "mardi",
    "mercredi",
    "jeudi",
    "vendredi",
    "avant le",
    // Russian
    "понедельник",
    "вторник",
    "среда",
    "четверг",
    "пятниц",
    "до конца",
    "крайний срок",
];

/// Signatures of automated/service mail, matched against subject, body,
/// and sender address.
const SERVICE_SIGNATURES: &[&str] = &[
    "auto-reply",
    "automatic reply",
    "autoreply",
    "out of office",
    "delivery status notification",
    "delivery has failed",
    "undeliverable",
    "mailer-daemon",
    "postmaster@",
    "no-reply",
    "noreply",
    "do not reply",
    "unsubscribe",
    "you are receiving this email because",
    "this is an automated message",
];

/// Prefixes of quoted-reply headers in supported languages. Compared
/// against trimmed, lowercased lines.
const QUOTE_HEADER_PREFIXES: &[&str] = &[
    "-----original message-----",
    "-----ursprüngliche nachricht-----",
    "________________________________",
    "from:",
    "von:",
    "de :",
    "от:",
    "sent:",
    "gesendet:",
];

/// Counts priority-keyword hits in `text` (case-insensitive).
pub fn keyword_hits(text: &str) -> u32 {
    let lower = text.to_lowercase();
    PRIORITY_KEYWORDS
        .iter()
        .filter(|kw| lower.contains(*kw))
        .count() as u32
}

/// Returns true if `text` mentions a date or deadline.
///
/// Checks the word tables first, then scans for numeric date shapes
/// (`12.05`, `12/05`, `2026-05-12`).
pub fn mentions_date(text: &str) -> bool {
    let lower = text.to_lowercase();
    if DATE_WORDS.iter().any(|w| lower.contains(w)) {
        return true;
    }
    has_numeric_date(&lower)
}

/// Scans for digit-punctuation-digit shapes that look like dates.
fn has_numeric_date(text: &str) -> bool {
    let bytes = text.as_bytes();
    for (i, window) in bytes.windows(3).enumerate() {
        let sep = window[1];
        if (sep == b'.' || sep == b'/' || sep == b'-')
            && window[0].is_ascii_digit()
            && window[2].is_ascii_digit()
        {
            // Require a second separator nearby (dd.mm.yy) or a 4-digit
            // year start (2026-05) to avoid matching decimals.
            let tail = &bytes[i + 2..(i + 6).min(bytes.len())];
            if tail.iter().any(|&b| b == sep) {
                return true;
            }
            if i >= 3
                && bytes[i.saturating_sub(3)..i]
                    .iter()
                    .all(|b| b.is_ascii_digit())
                && sep == b'-'
            {
                return true;
            }
        }
    }
    false
}

/// Counts question marks in `text`.
pub fn question_count(text: &str) -> u32 {
    text.chars().filter(|&c| c == '?' || c == '？').count() as u32
}

/// Returns true if the message looks like automated/service mail.
pub fn is_service_mail(subject: Option<&str>, body: &str, sender: &str) -> bool {
    let sender = sender.to_lowercase();
    if SERVICE_SIGNATURES.iter().any(|sig| sender.contains(sig)) {
        return true;
    }
    if let Some(subject) = subject {
        let subject = subject.to_lowercase();
        if SERVICE_SIGNATURES.iter().any(|sig| subject.contains(sig)) {
            return true;
        }
    }
    let body = body.to_lowercase();
    SERVICE_SIGNATURES.iter().any(|sig| body.contains(sig))
}

/// Returns true if the trimmed line opens a quoted reply.
pub fn is_quoted_reply_header(line: &str) -> bool {
    let trimmed = line.trim().to_lowercase();
    if QUOTE_HEADER_PREFIXES.iter().any(|p| trimmed.starts_with(p)) {
        return true;
    }
    // "On <date>, <name> wrote:" and its translations. The sender name
    // may follow the verb, so only the trailing colon is positional.
    const ATTRIBUTION_FORMS: &[(&str, &str)] = &[("on ", "wrote"), ("am ", "schrieb"), ("le ", "écrit")];
    trimmed.ends_with(':')
        && ATTRIBUTION_FORMS
            .iter()
            .any(|(prefix, verb)| trimmed.starts_with(prefix) && trimmed.contains(verb))
}

/// Importance rank of a sender: critical senders rank 3, everyone else 0.
pub fn sender_rank(sender_email: &str, critical_senders: &[String]) -> u32 {
    let is_critical = critical_senders
        .iter()
        .any(|c| c.eq_ignore_ascii_case(sender_email));
    if is_critical {
        3
    } else {
        0
    }
}

/// Priority score: weighted linear combination of signals plus an
/// exponential recency term. Pure in `(signals, weights, age_hours)`.
pub fn priority_score(signals: &ChunkSignals, weights: &ScoreWeights, age_hours: f64) -> f64 {
    let mut score = 0.0;
    score += f64::from(signals.keyword_hits) * weights.keyword;
    if signals.mentions_date {
        score += weights.date_mention;
    }
    score += f64::from(signals.question_count) * weights.question;
    if signals.addressed_to_me {
        score += weights.addressed_to_me;
    }
    score += f64::from(signals.sender_rank) * weights.sender_rank;
    if signals.has_attachment {
        score += weights.attachment;
    }

    let half_life = weights.recency_half_life_hours.max(f64::EPSILON);
    let decay = 0.5_f64.powf(age_hours.max(0.0) / half_life);
    score + weights.recency * decay
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keyword_hits_counted_across_languages() {
        assert_eq!(keyword_hits("This is urgent, deadline tomorrow"), 2);
        assert_eq!(keyword_hits("Das ist dringend und wichtig"), 2);
        assert_eq!(keyword_hits("Это срочно"), 1);
        assert_eq!(keyword_hits("nothing special here"), 0);
    }

    #[test]
    fn date_words_detected() {
        assert!(mentions_date("Let's meet on Friday"));
        assert!(mentions_date("Abgabe bis zum Ende"));
        assert!(mentions_date("due next week"));
        assert!(!mentions_date("no temporal content"));
    }

    #[test]
    fn numeric_dates_detected() {
        assert!(mentions_date("the release is planned for 12.05.2026"));
        assert!(mentions_date("see 2026-05-12 for details"));
        assert!(mentions_date("meeting on 3/14/25"));
        // A bare decimal is not a date.
        assert!(!mentions_date("the value rose by 3.5 percent"));
    }

    #[test]
    fn service_mail_detection() {
        assert!(is_service_mail(
            Some("Automatic reply: vacation"),
            "I am out of office",
            "alice@example.com"
        ));
        assert!(is_service_mail(None, "body", "no-reply@service.com"));
        assert!(is_service_mail(
            None,
            "Click here to unsubscribe from this list",
            "news@letters.com"
        ));
        assert!(!is_service_mail(
            Some("Budget question"),
            "Can you check the numbers?",
            "bob@example.com"
        ));
    }

    #[test]
    fn quoted_reply_headers() {
        assert!(is_quoted_reply_header("On Mon, Jan 5, 2026, Alice wrote:"));
        assert!(is_quoted_reply_header("Am 05.01.2026 schrieb Bob:"));
        assert!(is_quoted_reply_header("-----Original Message-----"));
        assert!(is_quoted_reply_header("От: Иван Петров"));
        assert!(!is_quoted_reply_header("On the other hand, this works"));
    }

    #[test]
    fn sender_rank_for_critical_senders() {
        let critical = vec!["ceo@example.com".to_string()];
        assert_eq!(sender_rank("CEO@example.com", &critical), 3);
        assert_eq!(sender_rank("bob@example.com", &critical), 0);
    }

    #[test]
    fn question_marks_counted() {
        assert_eq!(question_count("What? When? Where?"), 3);
        assert_eq!(question_count("no questions"), 0);
    }

    #[test]
    fn score_is_linear_in_signals() {
        let weights = ScoreWeights::default();
        let base = ChunkSignals::default();
        let with_date = ChunkSignals {
            mentions_date: true,
            ..Default::default()
        };

        let s0 = priority_score(&base, &weights, 0.0);
        let s1 = priority_score(&with_date, &weights, 0.0);
        assert!((s1 - s0 - weights.date_mention).abs() < 1e-9);
    }

    #[test]
    fn recency_decays_with_age() {
        let weights = ScoreWeights::default();
        let signals = ChunkSignals::default();
        let fresh = priority_score(&signals, &weights, 0.0);
        let day_old = priority_score(&signals, &weights, 24.0);
        let week_old = priority_score(&signals, &weights, 168.0);
        assert!(fresh > day_old);
        assert!(day_old > week_old);
        // Half-life of 24h halves the recency term exactly.
        assert!((fresh - weights.recency * 0.5 - day_old).abs() < 1e-9);
    }

    #[test]
    fn score_is_deterministic() {
        let weights = ScoreWeights::default();
        let signals = ChunkSignals {
            keyword_hits: 2,
            mentions_date: true,
            addressed_to_me: true,
            sender_rank: 3,
            has_attachment: false,
            question_count: 1,
            service_mail: false,
        };
        let a = priority_score(&signals, &weights, 5.0);
        let b = priority_score(&signals, &weights, 5.0);
        assert_eq!(a, b);
    }
}
