use chrono::NaiveDate;
use serde::Deserialize;

/// Project usage `days_from_now` days ahead; the rule fires when the
/// projection exceeds `threshold` as a fraction of quota.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq)]
pub struct WarningRule {
    pub days_from_now: i64,
    pub threshold: f64,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct WarningTier {
    pub level: u8,
    pub rules: Vec<WarningRule>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct WarningPolicy {
    #[serde(default = "default_level")]
    pub default_level: u8,
    #[serde(default = "default_tiers")]
    pub tiers: Vec<WarningTier>,
}

fn default_level() -> u8 {
    1
}

fn default_tiers() -> Vec<WarningTier> {
    vec![
        WarningTier {
            level: 2,
            rules: vec![WarningRule {
                days_from_now: 7,
                threshold: 0.8,
            }],
        },
        WarningTier {
            level: 3,
            rules: vec![WarningRule {
                days_from_now: 3,
                threshold: 0.95,
            }],
        },
    ]
}

impl Default for WarningPolicy {
    fn default() -> Self {
        Self {
            default_level: default_level(),
            tiers: default_tiers(),
        }
    }
}

/// Inputs to the extrapolation for one group base directory.
#[derive(Debug, Clone, Copy)]
pub struct UsageTrend<'a> {
    /// Usage measured by this census.
    pub usage: u64,
    /// Date of this census.
    pub census_date: NaiveDate,
    /// Reference "today".
    pub today: NaiveDate,
    /// Earlier observations, oldest first.
    pub history: &'a [(NaiveDate, u64)],
}

impl UsageTrend<'_> {
    /// Linear projection of usage `days_from_now` days past today, from the
    /// current census and the second-to-last historical observation.
    ///
    /// `None` when there are fewer than two historical points or the
    /// observations do not span a positive number of days, in which case no
    /// rule can fire.
    pub fn project(&self, days_from_now: i64) -> Option<f64> {
        if self.history.len() < 2 {
            return None;
        }
        let (past_date, past_usage) = self.history[self.history.len() - 2];

        let days_since_census = (self.today - self.census_date).num_days();
        let days_between = (self.census_date - past_date).num_days();
        if days_between <= 0 {
            return None;
        }

        let usage = self.usage as f64;
        let slope = usage - past_usage as f64;
        Some(usage + ((days_from_now + days_since_census) as f64 / days_between as f64) * slope)
    }
}

impl WarningPolicy {
    /// Highest tier with at least one firing rule, or the default level.
    pub fn level(&self, trend: &UsageTrend<'_>, quota: Option<u64>) -> u8 {
        let quota = match quota {
            Some(q) if q > 0 => q as f64,
            _ => return self.default_level,
        };

        self.tiers
            .iter()
            .filter(|tier| {
                tier.rules.iter().any(|rule| {
                    trend
                        .project(rule.days_from_now)
                        .is_some_and(|projected| projected / quota > rule.threshold)
                })
            })
            .map(|tier| tier.level)
            .fold(self.default_level, u8::max)
    }
}
