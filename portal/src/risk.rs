//! Keyword heuristic that triages questionnaire answers.
//!
//! This is a screening aid for the admin team, not a clinical assessment.
//! Answers are lower-cased and folded to plain ASCII vowels before matching,
//! and every keyword below is stored already folded.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Question id (`q1`..`q9`) to free-text answer.
pub type Answers = BTreeMap<String, String>;

/// Each one present adds [`CRITICAL_WEIGHT`].
const CRITICAL_KEYWORDS: &[&str] = &[
    "suicid",
    "matarme",
    "matar",
    "morir",
    "no quiero vivir",
    "autoles",
    "cort",
    "me hice dano",
    "me hago dano",
];

/// Each one present adds [`AT_RISK_WEIGHT`].
const AT_RISK_KEYWORDS: &[&str] = &[
    "depres",
    "ansied",
    "panic",
    "ataque",
    "insom",
    "estres",
    "lloro",
    "triste",
    "vacio",
    "agot",
    "sin energia",
];

const CRITICAL_WEIGHT: i64 = 8;
const AT_RISK_WEIGHT: i64 = 3;

/// The mood question gets an extra check of its own.
const MOOD_QUESTION: &str = "q4";

const CRITICAL_THRESHOLD: i64 = 14;
const AT_RISK_THRESHOLD: i64 = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Normal,
    AtRisk,
    Critical,
}

impl RiskLevel {
    /// Tag stored in `questionnaires.risk_level`.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::AtRisk => "at_risk",
            Self::Critical => "critical",
        }
    }

    fn from_score(score: i64) -> Self {
        if score >= CRITICAL_THRESHOLD {
            Self::Critical
        } else if score >= AT_RISK_THRESHOLD {
            Self::AtRisk
        } else {
            Self::Normal
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown risk level '{0}' (expected normal, at_risk or critical)")]
pub struct ParseRiskLevelError(String);

impl FromStr for RiskLevel {
    type Err = ParseRiskLevelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "normal" => Ok(Self::Normal),
            "at_risk" => Ok(Self::AtRisk),
            "critical" => Ok(Self::Critical),
            other => Err(ParseRiskLevelError(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Assessment {
    pub score: i64,
    pub level: RiskLevel,
}

/// Score all answers and derive the level.
pub fn classify(answers: &Answers) -> Assessment {
    let joined = answers
        .values()
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join(" ");
    let mut score = score_text(&fold(&joined));

    if let Some(mood) = answers.get(MOOD_QUESTION) {
        let mood = fold(mood);
        if mood.contains("muy mal") || mood.contains("horrible") {
            score += 3;
        }
    }

    Assessment {
        score,
        level: RiskLevel::from_score(score),
    }
}

fn score_text(text: &str) -> i64 {
    let hits = |keywords: &[&str]| keywords.iter().filter(|k| text.contains(*k)).count() as i64;

    let mut score =
        hits(CRITICAL_KEYWORDS) * CRITICAL_WEIGHT + hits(AT_RISK_KEYWORDS) * AT_RISK_WEIGHT;

    // frequency / intensity
    if text.contains("siempre") || text.contains("todos los dias") {
        score += 2;
    }
    if text.contains("a menudo") || text.contains("frecuente") {
        score += 1;
    }
    score
}

/// Lower-case and strip the diacritics that occur in Spanish text.
fn fold(text: &str) -> String {
    text.chars()
        .flat_map(char::to_lowercase)
        .map(|c| match c {
            'á' | 'à' | 'â' | 'ä' | 'ã' => 'a',
            'é' | 'è' | 'ê' | 'ë' => 'e',
            'í' | 'ì' | 'î' | 'ï' => 'i',
            'ó' | 'ò' | 'ô' | 'ö' | 'õ' => 'o',
            'ú' | 'ù' | 'û' | 'ü' => 'u',
            'ñ' => 'n',
            'ç' => 'c',
            other => other,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn answers(pairs: &[(&str, &str)]) -> Answers {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_empty_answers_are_normal() {
        let result = classify(&Answers::new());
        assert_eq!(
            result,
            Assessment {
                score: 0,
                level: RiskLevel::Normal
            }
        );
    }

    #[test]
    fn test_neutral_answers_score_zero() {
        let result = classify(&answers(&[
            ("q1", "Todo bien, duermo bien"),
            ("q2", "Me gusta el futbol"),
        ]));
        assert_eq!(result.score, 0);
        assert_eq!(result.level, RiskLevel::Normal);
    }

    #[test]
    fn test_at_risk_keywords_and_frequency() {
        // triste + ansied + siempre
        let result = classify(&answers(&[
            ("q1", "Me siento triste"),
            ("q2", "ansiedad siempre"),
        ]));
        assert_eq!(result.score, 8);
        assert_eq!(result.level, RiskLevel::AtRisk);
    }

    #[test]
    fn test_critical_keywords() {
        let text = "No quiero vivir, pienso en el suicidio";
        let result = classify(&answers(&[("q3", text)]));
        assert_eq!(result.score, 16);
        assert_eq!(result.level, RiskLevel::Critical);
    }

    #[test]
    fn test_diacritics_and_case_are_folded() {
        // depres + estres
        let result = classify(&answers(&[("q1", "DEPRESIÓN y Estrés")]));
        assert_eq!(result.score, 6);
        assert_eq!(result.level, RiskLevel::AtRisk);

        let result = classify(&answers(&[("q1", "Me siento vacío y sin energía")]));
        assert_eq!(result.score, 6);
    }

    #[test]
    fn test_mood_question_adds_weight() {
        let result = classify(&answers(&[("q4", "Muy mal")]));
        assert_eq!(result.score, 3);

        // same words outside q4 only count as plain text
        let result = classify(&answers(&[("q5", "Muy mal")]));
        assert_eq!(result.score, 0);
    }

    #[test]
    fn test_thresholds() {
        assert_eq!(RiskLevel::from_score(5), RiskLevel::Normal);
        assert_eq!(RiskLevel::from_score(6), RiskLevel::AtRisk);
        assert_eq!(RiskLevel::from_score(13), RiskLevel::AtRisk);
        assert_eq!(RiskLevel::from_score(14), RiskLevel::Critical);
    }

    #[test]
    fn test_level_tags_round_trip() {
        for level in [RiskLevel::Normal, RiskLevel::AtRisk, RiskLevel::Critical] {
            assert_eq!(level.as_str().parse::<RiskLevel>(), Ok(level));
            assert_eq!(
                serde_json::to_string(&level).unwrap(),
                format!("\"{}\"", level.as_str())
            );
        }
        assert!("at-risk".parse::<RiskLevel>().is_err());
    }
}
