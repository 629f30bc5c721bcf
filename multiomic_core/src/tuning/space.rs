//! Hyperparameter search spaces and sampled configurations.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use rand::rngs::StdRng;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::{OmicsError, OmicsResult};

/// Encoder architecture a search space belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EncoderKind {
    FeedForward,
    Variational,
    Graph,
    Triplet,
}

impl FromStr for EncoderKind {
    type Err = OmicsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "feed_forward" | "feedforward" | "directpred" => Ok(EncoderKind::FeedForward),
            "variational" | "supervised_vae" | "vae" => Ok(EncoderKind::Variational),
            "graph" | "gnn" => Ok(EncoderKind::Graph),
            "triplet" | "multitripletnetwork" => Ok(EncoderKind::Triplet),
            other => Err(OmicsError::configuration(
                "encoder",
                format!("unknown encoder kind '{other}'"),
            )),
        }
    }
}

impl fmt::Display for EncoderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EncoderKind::FeedForward => "feed_forward",
            EncoderKind::Variational => "variational",
            EncoderKind::Graph => "graph",
            EncoderKind::Triplet => "triplet",
        };
        f.write_str(name)
    }
}

/// Distribution of one hyperparameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ParamSpec {
    /// Uniform over `low..=high`
    Integer { low: i64, high: i64 },
    /// Uniform over `[low, high]`, or log-uniform when `log_scale`
    Real {
        low: f64,
        high: f64,
        #[serde(default)]
        log_scale: bool,
    },
    Categorical { choices: Vec<String> },
}

impl ParamSpec {
    pub fn integer(low: i64, high: i64) -> Self {
        ParamSpec::Integer { low, high }
    }

    pub fn real(low: f64, high: f64) -> Self {
        ParamSpec::Real {
            low,
            high,
            log_scale: false,
        }
    }

    pub fn log_real(low: f64, high: f64) -> Self {
        ParamSpec::Real {
            low,
            high,
            log_scale: true,
        }
    }

    pub fn categorical<S: Into<String>>(choices: impl IntoIterator<Item = S>) -> Self {
        ParamSpec::Categorical {
            choices: choices.into_iter().map(Into::into).collect(),
        }
    }

    fn validate(&self, name: &str) -> OmicsResult<()> {
        let context = format!("search space '{name}'");
        match self {
            ParamSpec::Integer { low, high } if low > high => Err(OmicsError::configuration(
                context,
                format!("low {low} exceeds high {high}"),
            )),
            ParamSpec::Real { low, high, .. } if !(low.is_finite() && high.is_finite()) || low > high => {
                Err(OmicsError::configuration(
                    context,
                    format!("invalid range [{low}, {high}]"),
                ))
            }
            ParamSpec::Real {
                low,
                log_scale: true,
                ..
            } if *low <= 0.0 => Err(OmicsError::configuration(
                context,
                "log-scaled range must be positive",
            )),
            ParamSpec::Categorical { choices } if choices.is_empty() => {
                Err(OmicsError::configuration(context, "no choices"))
            }
            _ => Ok(()),
        }
    }

    fn sample(&self, rng: &mut StdRng) -> ParamValue {
        match self {
            ParamSpec::Integer { low, high } => ParamValue::Integer(rng.gen_range(*low..=*high)),
            ParamSpec::Real {
                low,
                high,
                log_scale,
            } => {
                if low == high {
                    return ParamValue::Real(*low);
                }
                if *log_scale {
                    ParamValue::Real(rng.gen_range(low.ln()..high.ln()).exp())
                } else {
                    ParamValue::Real(rng.gen_range(*low..*high))
                }
            }
            ParamSpec::Categorical { choices } => {
                ParamValue::Text(choices[rng.gen_range(0..choices.len())].clone())
            }
        }
    }
}

/// One sampled hyperparameter value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamValue {
    Integer(i64),
    Real(f64),
    Text(String),
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Integer(v) => write!(f, "{v}"),
            ParamValue::Real(v) => write!(f, "{v:.6}"),
            ParamValue::Text(v) => f.write_str(v),
        }
    }
}

/// Expected kind of a hyperparameter in an architecture's schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    PositiveInteger,
    PositiveReal,
    Text,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParamRequirement {
    pub name: &'static str,
    pub kind: ParamKind,
}

impl ParamRequirement {
    pub const fn new(name: &'static str, kind: ParamKind) -> Self {
        Self { name, kind }
    }
}

/// Flat hyperparameter name → value mapping for one model instance.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HyperParams(BTreeMap<String, ParamValue>);

impl HyperParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: ParamValue) -> Self {
        self.0.insert(name.into(), value);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: ParamValue) {
        self.0.insert(name.into(), value);
    }

    pub fn get(&self, name: &str) -> Option<&ParamValue> {
        self.0.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &ParamValue)> {
        self.0.iter()
    }

    pub fn usize(&self, name: &str) -> OmicsResult<usize> {
        match self.get(name) {
            Some(ParamValue::Integer(v)) if *v > 0 => Ok(*v as usize),
            Some(ParamValue::Real(v)) if *v >= 1.0 && v.fract() == 0.0 => Ok(*v as usize),
            other => Err(param_error(name, "a positive integer", other)),
        }
    }

    pub fn f32(&self, name: &str) -> OmicsResult<f32> {
        match self.get(name) {
            Some(ParamValue::Real(v)) if v.is_finite() => Ok(*v as f32),
            Some(ParamValue::Integer(v)) => Ok(*v as f32),
            other => Err(param_error(name, "a number", other)),
        }
    }

    pub fn text(&self, name: &str) -> OmicsResult<&str> {
        match self.get(name) {
            Some(ParamValue::Text(v)) => Ok(v),
            other => Err(param_error(name, "a string", other)),
        }
    }

    pub fn f32_or(&self, name: &str, default: f32) -> OmicsResult<f32> {
        if self.get(name).is_some() {
            self.f32(name)
        } else {
            Ok(default)
        }
    }

    pub fn text_or<'a>(&'a self, name: &str, default: &'a str) -> OmicsResult<&'a str> {
        if self.get(name).is_some() {
            self.text(name)
        } else {
            Ok(default)
        }
    }

    /// Check every required parameter is present with the right kind.
    pub fn validate(&self, schema: &[ParamRequirement]) -> OmicsResult<()> {
        for requirement in schema {
            match requirement.kind {
                ParamKind::PositiveInteger => {
                    self.usize(requirement.name)?;
                }
                ParamKind::PositiveReal => {
                    let value = self.f32(requirement.name)?;
                    if value <= 0.0 {
                        return Err(param_error(requirement.name, "positive", self.get(requirement.name)));
                    }
                }
                ParamKind::Text => {
                    self.text(requirement.name)?;
                }
            }
        }
        Ok(())
    }
}

fn param_error(name: &str, expected: &str, found: Option<&ParamValue>) -> OmicsError {
    let found = found
        .map(|v| format!("'{v}'"))
        .unwrap_or_else(|| "nothing".to_string());
    OmicsError::configuration(
        format!("hyperparameter '{name}'"),
        format!("expected {expected}, found {found}"),
    )
}

/// Named parameter distributions sampled once per search iteration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SearchSpace {
    params: BTreeMap<String, ParamSpec>,
}

impl SearchSpace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, spec: ParamSpec) -> Self {
        self.params.insert(name.into(), spec);
        self
    }

    pub fn params(&self) -> &BTreeMap<String, ParamSpec> {
        &self.params
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    /// Default ranges for an architecture.
    pub fn for_encoder(kind: EncoderKind) -> Self {
        let base = SearchSpace::new()
            .with("latent_dim", ParamSpec::integer(16, 128))
            .with("hidden_dim_factor", ParamSpec::real(0.2, 1.0))
            .with("lr", ParamSpec::log_real(1e-4, 1e-2))
            .with("supervisor_hidden_dim", ParamSpec::integer(2, 20));

        match kind {
            EncoderKind::FeedForward => base.with("activation", ParamSpec::categorical(["relu"])),
            EncoderKind::Variational => base.with("kl_weight", ParamSpec::log_real(1e-3, 1.0)),
            EncoderKind::Graph => base
                .with("latent_dim", ParamSpec::integer(8, 64))
                .with("activation", ParamSpec::categorical(["relu", "tanh", "sigmoid"])),
            EncoderKind::Triplet => base.with("margin", ParamSpec::real(0.5, 2.0)),
        }
    }

    /// Entries of `overrides` replace or extend this space.
    pub fn merged(mut self, overrides: &SearchSpace) -> Self {
        for (name, spec) in &overrides.params {
            self.params.insert(name.clone(), spec.clone());
        }
        self
    }

    pub fn validate(&self) -> OmicsResult<()> {
        if self.params.is_empty() {
            return Err(OmicsError::configuration("search space", "no parameters"));
        }
        self.params
            .iter()
            .try_for_each(|(name, spec)| spec.validate(name))
    }

    pub fn sample(&self, rng: &mut StdRng) -> HyperParams {
        HyperParams(
            self.params
                .iter()
                .map(|(name, spec)| (name.clone(), spec.sample(rng)))
                .collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn test_samples_stay_in_range() {
        let space = SearchSpace::for_encoder(EncoderKind::FeedForward);
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..50 {
            let params = space.sample(&mut rng);
            let latent = params.usize("latent_dim").unwrap();
            assert!((16..=128).contains(&latent));
            let lr = params.f32("lr").unwrap();
            assert!(lr > 0.9e-4 && lr < 1.1e-2);
            assert_eq!(params.text("activation").unwrap(), "relu");
        }
    }

    #[test]
    fn test_sampling_is_deterministic() {
        let space = SearchSpace::for_encoder(EncoderKind::Triplet);
        let a = space.sample(&mut StdRng::seed_from_u64(3));
        let b = space.sample(&mut StdRng::seed_from_u64(3));
        assert_eq!(a, b);
    }

    #[test]
    fn test_invalid_ranges_rejected() {
        let space = SearchSpace::new().with("lr", ParamSpec::log_real(0.0, 1.0));
        assert!(space.validate().is_err());
        let space = SearchSpace::new().with("latent_dim", ParamSpec::integer(10, 2));
        assert!(space.validate().is_err());
        assert!(SearchSpace::new().validate().is_err());
    }

    #[test]
    fn test_schema_validation() {
        let schema = [
            ParamRequirement::new("latent_dim", ParamKind::PositiveInteger),
            ParamRequirement::new("lr", ParamKind::PositiveReal),
        ];
        let params = HyperParams::new()
            .with("latent_dim", ParamValue::Integer(8))
            .with("lr", ParamValue::Real(0.01));
        assert!(params.validate(&schema).is_ok());

        let missing = HyperParams::new().with("latent_dim", ParamValue::Integer(8));
        let err = missing.validate(&schema).unwrap_err();
        assert!(matches!(err, OmicsError::Configuration { .. }));

        let negative = params.clone().with("lr", ParamValue::Real(-1.0));
        assert!(negative.validate(&schema).is_err());
    }

    #[test]
    fn test_space_from_toml() {
        let space: SearchSpace = toml::from_str(
            r#"
            [latent_dim]
            type = "integer"
            low = 4
            high = 8

            [lr]
            type = "real"
            low = 0.001
            high = 0.01
            log_scale = true
            "#,
        )
        .unwrap();
        assert_eq!(space.params()["latent_dim"], ParamSpec::integer(4, 8));
        assert!(space.validate().is_ok());
    }

    #[test]
    fn test_encoder_kind_aliases() {
        assert_eq!("DirectPred".parse::<EncoderKind>().unwrap(), EncoderKind::FeedForward);
        assert_eq!("gnn".parse::<EncoderKind>().unwrap(), EncoderKind::Graph);
        assert!("transformer".parse::<EncoderKind>().is_err());
    }
}
