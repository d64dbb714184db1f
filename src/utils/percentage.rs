use std::{fmt::Display, ops::Deref, str::FromStr};

use anyhow::anyhow;
use chrono::Duration;

#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct Percentage(f64);

impl Display for Percentage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}%", self.0)
    }
}

impl Percentage {
    pub const ZERO: Percentage = Percentage(0.);

    pub fn new_opt(value: f64) -> Option<Percentage> {
        if value.is_nan() || value < 0. {
            None
        } else {
            Some(Percentage(value))
        }
    }
}

impl FromStr for Percentage {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // This means that 100%% also works, but I think I'm fine with that
        let s = s.trim_end_matches("%");
        let v = s.parse::<f64>()?;
        Percentage::new_opt(v).ok_or_else(|| anyhow!("Can't parse {s} into percentage"))
    }
}

impl Deref for Percentage {
    type Target = f64;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

/// Share of `whole` taken by `value`. An empty `whole` yields zero.
pub fn duration_percentage(value: Duration, whole: Duration) -> Percentage {
    if whole.num_seconds() <= 0 {
        return Percentage::ZERO;
    }
    Percentage::new_opt(value.num_seconds() as f64 / whole.num_seconds() as f64 * 100.)
        .unwrap_or(Percentage::ZERO)
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::{duration_percentage, Percentage};

    #[test]
    fn parses_with_and_without_sign() {
        assert_eq!("5".parse::<Percentage>().unwrap(), Percentage::new_opt(5.).unwrap());
        assert_eq!("12.5%".parse::<Percentage>().unwrap(), Percentage::new_opt(12.5).unwrap());
        assert!("-1".parse::<Percentage>().is_err());
    }

    #[test]
    fn zero_whole_is_zero_percent() {
        assert_eq!(
            duration_percentage(Duration::seconds(10), Duration::zero()),
            Percentage::ZERO
        );
        assert_eq!(*duration_percentage(Duration::seconds(30), Duration::seconds(120)), 25.);
    }
}
