//! `now()`, `today()` and `timeOfDay()`, read from the context clock.

use crate::context::Context;
use crate::error::Result;
use crate::temporal::{FhirDate, FhirDateTime, FhirTime, TimePrecision};
use crate::value::{Collection, Value};

pub fn now(ctx: &Context) -> Result<Collection> {
    Ok(Collection::singleton(Value::date_time(FhirDateTime::from_fixed(
        ctx.now(),
    ))))
}

pub fn today(ctx: &Context) -> Result<Collection> {
    Ok(Collection::singleton(Value::date(FhirDate::from_naive(
        ctx.now().date_naive(),
    ))))
}

pub fn time_of_day(ctx: &Context) -> Result<Collection> {
    Ok(Collection::singleton(Value::time(FhirTime {
        time: ctx.now().time(),
        precision: TimePrecision::Millisecond,
    })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{FixedOffset, TimeZone};

    #[test]
    fn test_today_uses_context_clock() {
        let Some(fixed) = FixedOffset::east_opt(3600)
            .and_then(|tz| tz.with_ymd_and_hms(2024, 5, 17, 23, 30, 0).single())
        else {
            panic!("valid test timestamp");
        };
        let ctx = Context::new(Collection::empty()).with_now(fixed);
        let today = today(&ctx).unwrap();
        assert_eq!(today.first().unwrap().to_json(), serde_json::json!("2024-05-17"));
    }
}
