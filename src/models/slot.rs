use chrono::{Duration, NaiveDate, NaiveDateTime, Timelike};
use serde::Serialize;

/// The fixed grid of bookable slots in a business day.
///
/// Slots are `slot_minutes` long, the first starts at `opening_hour` and the
/// last one must start before `closing_hour`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotGrid {
    pub opening_hour: u32,
    pub closing_hour: u32,
    pub slot_minutes: u32,
}

impl Default for SlotGrid {
    fn default() -> Self {
        Self {
            opening_hour: 5,
            closing_hour: 18,
            slot_minutes: 120,
        }
    }
}

impl SlotGrid {
    pub fn new(opening_hour: u32, closing_hour: u32, slot_minutes: u32) -> anyhow::Result<Self> {
        if opening_hour >= closing_hour || closing_hour > 24 {
            anyhow::bail!("invalid business hours: {opening_hour}:00-{closing_hour}:00");
        }
        if slot_minutes == 0 || slot_minutes > 24 * 60 {
            anyhow::bail!("invalid slot length: {slot_minutes} minutes");
        }
        Ok(Self {
            opening_hour,
            closing_hour,
            slot_minutes,
        })
    }

    /// Whether `start` is exactly the start of one of the day's slots.
    pub fn contains(&self, start: &NaiveDateTime) -> bool {
        if start.second() != 0 || start.nanosecond() != 0 {
            return false;
        }
        let minute_of_day = start.hour() * 60 + start.minute();
        let open = self.opening_hour * 60;
        let close = self.closing_hour * 60;
        minute_of_day >= open
            && minute_of_day < close
            && (minute_of_day - open) % self.slot_minutes == 0
    }

    pub fn end_of(&self, start: &NaiveDateTime) -> NaiveDateTime {
        *start + Duration::minutes(self.slot_minutes as i64)
    }

    pub fn slots_on(&self, date: NaiveDate) -> Vec<NaiveDateTime> {
        let Some(open) = date.and_hms_opt(self.opening_hour, 0, 0) else {
            return vec![];
        };
        let count = (self.closing_hour - self.opening_hour) * 60;
        let count = count.div_ceil(self.slot_minutes);
        (0..count)
            .map(|i| open + Duration::minutes((i * self.slot_minutes) as i64))
            .collect()
    }

    pub fn to_human_readable(&self) -> String {
        format!(
            "{:02}:00-{:02}:00 in {}-minute slots",
            self.opening_hour, self.closing_hour, self.slot_minutes
        )
    }
}

/// One row of a day's availability listing.
#[derive(Debug, Clone, Serialize)]
pub struct SlotAvailability {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    pub available: bool,
}
