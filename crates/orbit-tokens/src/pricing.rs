//! Static per-model price and rate-limit table

use std::fmt;
use std::str::FromStr;

use orbit_core::Error;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Model {
    #[serde(rename = "gpt-4")]
    Gpt4,
    #[serde(rename = "gpt-4o")]
    Gpt4o,
    #[serde(rename = "gpt-4o-mini")]
    Gpt4oMini,
    #[serde(rename = "gpt-4-turbo")]
    Gpt4Turbo,
    #[default]
    #[serde(rename = "gpt-3.5-turbo")]
    Gpt35Turbo,
}

/// USD per 1000 tokens
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ModelPricing {
    pub input_per_1k: f64,
    pub output_per_1k: f64,
}

/// Published limits; 999_999 stands in for "no limit"
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RateLimits {
    /// Tokens per minute
    pub tpm: u32,
    /// Requests per minute
    pub rpm: u32,
    /// Requests per day
    pub rpd: u32,
}

impl ModelPricing {
    pub fn cost(&self, prompt_tokens: u64, completion_tokens: u64) -> f64 {
        (prompt_tokens as f64 / 1000.0) * self.input_per_1k
            + (completion_tokens as f64 / 1000.0) * self.output_per_1k
    }
}

impl Model {
    pub const ALL: [Model; 5] = [
        Model::Gpt4,
        Model::Gpt4o,
        Model::Gpt4oMini,
        Model::Gpt4Turbo,
        Model::Gpt35Turbo,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Model::Gpt4 => "gpt-4",
            Model::Gpt4o => "gpt-4o",
            Model::Gpt4oMini => "gpt-4o-mini",
            Model::Gpt4Turbo => "gpt-4-turbo",
            Model::Gpt35Turbo => "gpt-3.5-turbo",
        }
    }

    /// Lenient lookup: unrecognized names price as the default model
    pub fn resolve(name: &str) -> Model {
        name.parse().unwrap_or_else(|_| {
            tracing::warn!(
                model = name,
                fallback = Model::default().as_str(),
                "Unrecognized model, using fallback pricing"
            );
            Model::default()
        })
    }

    pub fn pricing(&self) -> ModelPricing {
        let (input_per_1k, output_per_1k) = match self {
            Model::Gpt4 => (0.03, 0.06),
            Model::Gpt4o => (0.01, 0.03),
            Model::Gpt4oMini => (0.01, 0.03),
            Model::Gpt4Turbo => (0.01, 0.03),
            Model::Gpt35Turbo => (0.0015, 0.002),
        };
        ModelPricing {
            input_per_1k,
            output_per_1k,
        }
    }

    pub fn rate_limits(&self) -> RateLimits {
        let (tpm, rpm, rpd) = match self {
            Model::Gpt4 => (10_000, 500, 10_000),
            Model::Gpt4o => (30_000, 500, 999_999),
            Model::Gpt4oMini => (200_000, 500, 10_000),
            Model::Gpt4Turbo => (30_000, 500, 999_999),
            Model::Gpt35Turbo => (200_000, 500, 10_000),
        };
        RateLimits { tpm, rpm, rpd }
    }
}

impl fmt::Display for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Model {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Model::ALL
            .into_iter()
            .find(|model| model.as_str() == s.trim())
            .ok_or_else(|| Error::UnknownModel(s.to_string()))
    }
}
