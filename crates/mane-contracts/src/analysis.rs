use serde::{Deserialize, Deserializer, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HairTexture {
    Straight,
    Wavy,
    Curly,
    Coily,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HairDensity {
    Thin,
    Medium,
    Thick,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HairCondition {
    Dry,
    Oily,
    Healthy,
    Damaged,
}

/// Vision-model read of the subject's current hair, recovered from freeform
/// model text by the structured-result parser.
///
/// Providers are loose about the score field name; `realism_score` is an
/// observed alias, and a missing score falls back to a neutral midpoint
/// rather than failing the whole analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HairAnalysis {
    pub texture: HairTexture,
    pub density: HairDensity,
    pub condition: HairCondition,
    #[serde(
        alias = "realism_score",
        default = "default_quality_score",
        deserialize_with = "score_in_range"
    )]
    pub quality_score: u8,
    #[serde(default)]
    pub observations: String,
    #[serde(default)]
    pub recommendations: Vec<String>,
}

fn default_quality_score() -> u8 {
    5
}

/// Scores live on a 1..=10 scale; anything outside is a malformed reply, not
/// a value to carry forward.
fn score_in_range<'de, D>(deserializer: D) -> Result<u8, D::Error>
where
    D: Deserializer<'de>,
{
    let value = u8::deserialize(deserializer)?;
    if !(1..=10).contains(&value) {
        return Err(serde::de::Error::custom(format!(
            "score {value} outside the 1..=10 scale"
        )));
    }
    Ok(value)
}

/// Feasibility verdict for a requested style on a given subject.
///
/// `alternatives` is meaningful only when `is_realistic` is false; it is
/// absent or empty otherwise.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StyleAssessment {
    pub is_realistic: bool,
    #[serde(deserialize_with = "score_in_range")]
    pub feasibility_score: u8,
    #[serde(default)]
    pub reasoning: String,
    #[serde(default)]
    pub required_treatments: Vec<String>,
    #[serde(default)]
    pub recommended_products: Vec<String>,
    #[serde(default)]
    pub estimated_time: String,
    #[serde(default)]
    pub alternatives: Option<Vec<String>>,
}
