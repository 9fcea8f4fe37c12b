//! Procedural deadline calculation
//!
//! Counting rules:
//! - the start date itself is never counted
//! - `business` counting skips weekends and holidays
//! - `calendar` counting counts every day, but a deadline that lands on a
//!   weekend or holiday moves to the next business day

use crate::errors::{AgentError, Result};
use crate::tools::types::{ToolCapability, ToolOutput};
use crate::types::Tool;
use async_trait::async_trait;
use chrono::{Datelike, Duration, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeSet;

/// Longest deadline accepted, in days
const MAX_DAYS: u32 = 3650;

/// National fixed-date holidays as (month, day)
const NATIONAL_HOLIDAYS: &[(u32, u32)] = &[
    (1, 1),
    (4, 21),
    (5, 1),
    (9, 7),
    (10, 12),
    (11, 2),
    (11, 15),
    (11, 20),
    (12, 25),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Counting {
    #[default]
    Business,
    Calendar,
}

/// Calendar of non-business days
#[derive(Debug, Clone, Default)]
pub struct HolidayCalendar {
    extra: BTreeSet<NaiveDate>,
}

impl HolidayCalendar {
    pub fn new(extra: impl IntoIterator<Item = NaiveDate>) -> Self {
        Self {
            extra: extra.into_iter().collect(),
        }
    }

    pub fn is_holiday(&self, date: NaiveDate) -> bool {
        NATIONAL_HOLIDAYS.contains(&(date.month(), date.day())) || self.extra.contains(&date)
    }

    pub fn is_business_day(&self, date: NaiveDate) -> bool {
        !matches!(date.weekday(), Weekday::Sat | Weekday::Sun) && !self.is_holiday(date)
    }

    fn next_business_day(&self, mut date: NaiveDate) -> NaiveDate {
        while !self.is_business_day(date) {
            date += Duration::days(1);
        }
        date
    }

    /// Due date of a deadline of `days` days starting at `start`
    pub fn due_date(&self, start: NaiveDate, days: u32, counting: Counting) -> NaiveDate {
        match counting {
            Counting::Business => {
                let mut date = start;
                let mut counted = 0;
                while counted < days {
                    date += Duration::days(1);
                    if self.is_business_day(date) {
                        counted += 1;
                    }
                }
                date
            }
            Counting::Calendar => self.next_business_day(start + Duration::days(days as i64)),
        }
    }
}

#[derive(Debug, Deserialize)]
struct DeadlineParams {
    start_date: String,
    days: u32,
    #[serde(default)]
    counting: Counting,
    #[serde(default)]
    holidays: Vec<String>,
}

fn parse_date(raw: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|e| AgentError::Validation(format!("invalid date '{}': {}", raw, e)))
}

/// `calculate_deadline` capability
#[derive(Debug, Default)]
pub struct DeadlineTool {
    /// Local holidays applied to every calculation
    base_holidays: Vec<NaiveDate>,
}

impl DeadlineTool {
    pub fn new(base_holidays: Vec<NaiveDate>) -> Self {
        Self { base_holidays }
    }
}

#[async_trait]
impl ToolCapability for DeadlineTool {
    async fn execute(&self, params: serde_json::Value) -> Result<ToolOutput> {
        let params: DeadlineParams = serde_json::from_value(params)?;
        if params.days == 0 || params.days > MAX_DAYS {
            return Err(AgentError::Validation(format!(
                "days must be between 1 and {}",
                MAX_DAYS
            )));
        }

        let start = parse_date(&params.start_date)?;
        let extra = params
            .holidays
            .iter()
            .map(|d| parse_date(d))
            .collect::<Result<Vec<_>>>()?;
        let calendar =
            HolidayCalendar::new(self.base_holidays.iter().copied().chain(extra.into_iter()));
        let due = calendar.due_date(start, params.days, params.counting);

        Ok(ToolOutput::new(json!({
            "start_date": start.format("%Y-%m-%d").to_string(),
            "days": params.days,
            "counting": params.counting,
            "due_date": due.format("%Y-%m-%d").to_string(),
            "due_weekday": due.weekday().to_string(),
            "elapsed_calendar_days": (due - start).num_days(),
        })))
    }
}

pub fn deadline_tool() -> Tool {
    Tool {
        slug: "calculate_deadline".to_string(),
        name: "Calculate deadline".to_string(),
        description: "Compute a procedural deadline counted in business or calendar days, \
                      skipping weekends and holidays"
            .to_string(),
        function_name: "calculate_deadline".to_string(),
        parameters_schema: json!({
            "type": "object",
            "properties": {
                "start_date": {
                    "type": "string",
                    "pattern": "^\\d{4}-\\d{2}-\\d{2}$",
                    "description": "Date of the notice or publication (YYYY-MM-DD)"
                },
                "days": {
                    "type": "integer",
                    "minimum": 1,
                    "maximum": MAX_DAYS,
                    "description": "Length of the deadline in days"
                },
                "counting": {
                    "type": "string",
                    "enum": ["business", "calendar"],
                    "description": "Day counting rule (default: business)"
                },
                "holidays": {
                    "type": "array",
                    "items": { "type": "string", "pattern": "^\\d{4}-\\d{2}-\\d{2}$" },
                    "description": "Additional local holidays or court closures"
                }
            },
            "required": ["start_date", "days"]
        }),
        requires_auth: false,
        allowed_agents: None,
        is_active: true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_business_days_skip_weekend() {
        let calendar = HolidayCalendar::default();
        // Friday + 1 business day = Monday
        assert_eq!(
            calendar.due_date(date(2024, 3, 8), 1, Counting::Business),
            date(2024, 3, 11)
        );
        // 15 business days from Monday 2024-03-04
        assert_eq!(
            calendar.due_date(date(2024, 3, 4), 15, Counting::Business),
            date(2024, 3, 25)
        );
    }

    #[test]
    fn test_business_days_skip_holidays() {
        let calendar = HolidayCalendar::default();
        // May 1st is skipped
        assert_eq!(
            calendar.due_date(date(2024, 4, 30), 1, Counting::Business),
            date(2024, 5, 2)
        );

        let local = HolidayCalendar::new([date(2024, 3, 11)]);
        assert_eq!(
            local.due_date(date(2024, 3, 8), 1, Counting::Business),
            date(2024, 3, 12)
        );
    }

    #[test]
    fn test_calendar_days_roll_forward() {
        let calendar = HolidayCalendar::default();
        // 2024-03-01 + 30 days = Sunday 03-31 -> Monday 04-01
        assert_eq!(
            calendar.due_date(date(2024, 3, 1), 30, Counting::Calendar),
            date(2024, 4, 1)
        );
        // Lands on Christmas (Wednesday) -> 12-26
        assert_eq!(
            calendar.due_date(date(2024, 12, 20), 5, Counting::Calendar),
            date(2024, 12, 26)
        );
    }

    #[tokio::test]
    async fn test_tool_output() {
        let output = DeadlineTool::default()
            .execute(json!({"start_date": "2024-03-08", "days": 5}))
            .await
            .unwrap();

        assert_eq!(output.value["due_date"], "2024-03-15");
        assert_eq!(output.value["counting"], "business");
        assert_eq!(output.value["elapsed_calendar_days"], 7);
    }

    #[tokio::test]
    async fn test_invalid_input() {
        let tool = DeadlineTool::default();
        assert!(tool
            .execute(json!({"start_date": "08/03/2024", "days": 5}))
            .await
            .is_err());
        assert!(tool
            .execute(json!({"start_date": "2024-03-08", "days": 0}))
            .await
            .is_err());
    }
}
