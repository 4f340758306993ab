use serde::Serialize;

/// Health-risk band for an AQHI value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Category {
    #[serde(rename = "Low health risk")]
    Low,
    #[serde(rename = "Moderate health risk")]
    Moderate,
    #[serde(rename = "High health risk")]
    High,
    #[serde(rename = "Very high health risk")]
    VeryHigh,
}

/// Converts an AQHI value into its health-risk band.
///
/// | Range       | Band      |
/// |-------------|-----------|
/// | <= 3        | Low       |
/// | <= 6        | Moderate  |
/// | <= 10       | High      |
/// | > 10        | Very high |
pub fn category(aqhi: f64) -> Category {
    match aqhi {
        v if v <= 3.0 => Category::Low,
        v if v <= 6.0 => Category::Moderate,
        v if v <= 10.0 => Category::High,
        _ => Category::VeryHigh,
    }
}

impl Category {
    pub fn label(self) -> &'static str {
        match self {
            Category::Low => "Low health risk",
            Category::Moderate => "Moderate health risk",
            Category::High => "High health risk",
            Category::VeryHigh => "Very high health risk",
        }
    }
}
