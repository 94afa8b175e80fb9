use crate::model::{AttendanceRecord, AttendanceStatus};
use crate::roster::ClassInfo;
use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, HashSet};

pub const MONTH_NAMES: [&str; 12] = [
    "January",
    "February",
    "March",
    "April",
    "May",
    "June",
    "July",
    "August",
    "September",
    "October",
    "November",
    "December",
];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceStats {
    pub total_days: usize,
    /// Includes late days.
    pub present_days: usize,
    pub absent_days: usize,
    pub late_days: usize,
    pub percentage: u32,
}

/// Stats over an arbitrary record subset.
///
/// A record with an unrecognized status counts towards `total_days` only, so
/// `present_days + absent_days < total_days` exposes it.
pub fn compute_stats<'a, I>(records: I) -> AttendanceStats
where
    I: IntoIterator<Item = &'a AttendanceRecord>,
{
    let mut total = 0usize;
    let mut present = 0usize;
    let mut absent = 0usize;
    let mut late = 0usize;

    for r in records {
        total += 1;
        match r.status {
            AttendanceStatus::Present => present += 1,
            AttendanceStatus::Absent => absent += 1,
            AttendanceStatus::Late => late += 1,
            AttendanceStatus::Unrecognized(_) => {}
        }
    }

    AttendanceStats {
        total_days: total,
        present_days: present + late,
        absent_days: absent,
        late_days: late,
        percentage: percentage(present + late, total),
    }
}

/// `round(100 * attended / total)`, half away from zero, 0 for an empty set.
fn percentage(attended: usize, total: usize) -> u32 {
    if total == 0 {
        return 0;
    }
    ((200 * attended + total) / (2 * total)) as u32
}

pub fn unrecognized_count<'a, I>(records: I) -> usize
where
    I: IntoIterator<Item = &'a AttendanceRecord>,
{
    records
        .into_iter()
        .filter(|r| !r.status.is_recognized())
        .count()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Period {
    Day,
    Month,
    Year,
}

impl Period {
    pub fn matches(self, date: NaiveDate, anchor: NaiveDate) -> bool {
        match self {
            Period::Day => date == anchor,
            Period::Month => date.year() == anchor.year() && date.month() == anchor.month(),
            Period::Year => date.year() == anchor.year(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PeriodFilter {
    pub period: Period,
    pub anchor: NaiveDate,
}

impl PeriodFilter {
    pub fn new(period: Period, anchor: NaiveDate) -> Self {
        Self { period, anchor }
    }

    pub fn label(&self) -> String {
        match self.period {
            Period::Day => self.anchor.format("%A, %B %-d, %Y").to_string(),
            Period::Month => format!(
                "{} {}",
                MONTH_NAMES[self.anchor.month0() as usize],
                self.anchor.year()
            ),
            Period::Year => self.anchor.year().to_string(),
        }
    }
}

pub fn filter_by_period(
    records: &[AttendanceRecord],
    period: Period,
    anchor: NaiveDate,
) -> Vec<AttendanceRecord> {
    records
        .iter()
        .filter(|r| period.matches(r.date, anchor))
        .cloned()
        .collect()
}

fn apply_period(records: Vec<AttendanceRecord>, filter: Option<PeriodFilter>) -> Vec<AttendanceRecord> {
    match filter {
        Some(f) => records
            .into_iter()
            .filter(|r| f.period.matches(r.date, f.anchor))
            .collect(),
        None => records,
    }
}

/// Newest date first; same-day records keep a stable order by student then class.
pub fn sort_newest_first(records: &mut [AttendanceRecord]) {
    records.sort_by(|a, b| {
        b.date
            .cmp(&a.date)
            .then_with(|| a.student_id.cmp(&b.student_id))
            .then_with(|| a.class_id.cmp(&b.class_id))
    });
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentStatsRow {
    pub student_id: String,
    pub stats: AttendanceStats,
}

fn by_percentage_desc(a: &AttendanceStats, b: &AttendanceStats) -> Ordering {
    b.percentage.cmp(&a.percentage)
}

/// One row per roster student, best attendance first, ties by student id.
///
/// Only records of `class_id` count, so a student's marks in other classes
/// never leak into this class's rows.
pub fn class_breakdown(
    records: &[AttendanceRecord],
    class_id: &str,
    class_roster: &[String],
) -> Vec<StudentStatsRow> {
    let mut rows: Vec<StudentStatsRow> = class_roster
        .iter()
        .collect::<BTreeSet<_>>()
        .into_iter()
        .map(|student_id| StudentStatsRow {
            student_id: student_id.clone(),
            stats: compute_stats(
                records
                    .iter()
                    .filter(|r| r.class_id == class_id && r.student_id == *student_id),
            ),
        })
        .collect();
    rows.sort_by(|a, b| {
        by_percentage_desc(&a.stats, &b.stats).then_with(|| a.student_id.cmp(&b.student_id))
    });
    rows
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthlyAttendance {
    pub month: u32,
    pub label: &'static str,
    pub year: i32,
    pub stats: AttendanceStats,
    pub records: Vec<AttendanceRecord>,
}

/// Buckets one year's records by calendar month. Months without records are absent.
pub fn monthly_breakdown(records: &[AttendanceRecord], year: i32) -> BTreeMap<u32, MonthlyAttendance> {
    let mut buckets: BTreeMap<u32, Vec<AttendanceRecord>> = BTreeMap::new();
    for r in records.iter().filter(|r| r.date.year() == year) {
        buckets.entry(r.date.month()).or_default().push(r.clone());
    }
    buckets
        .into_iter()
        .map(|(month, mut month_records)| {
            sort_newest_first(&mut month_records);
            let stats = compute_stats(&month_records);
            (
                month,
                MonthlyAttendance {
                    month,
                    label: MONTH_NAMES[(month - 1) as usize],
                    year,
                    stats,
                    records: month_records,
                },
            )
        })
        .collect()
}

pub fn available_years(records: &[AttendanceRecord]) -> Vec<i32> {
    let years: BTreeSet<i32> = records.iter().map(|r| r.date.year()).collect();
    years.into_iter().rev().collect()
}

pub fn available_months(records: &[AttendanceRecord], year: i32) -> Vec<u32> {
    let months: BTreeSet<u32> = records
        .iter()
        .filter(|r| r.date.year() == year)
        .map(|r| r.date.month())
        .collect();
    months.into_iter().rev().collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentYearlySummary {
    pub student_id: String,
    pub year: i32,
    pub yearly_stats: AttendanceStats,
    pub monthly_breakdown: Vec<MonthlyAttendance>,
}

pub fn student_yearly_summary(
    records: &[AttendanceRecord],
    student_id: &str,
    year: i32,
) -> StudentYearlySummary {
    let own: Vec<AttendanceRecord> = records
        .iter()
        .filter(|r| r.student_id == student_id && r.date.year() == year)
        .cloned()
        .collect();
    StudentYearlySummary {
        student_id: student_id.to_string(),
        year,
        yearly_stats: compute_stats(&own),
        monthly_breakdown: monthly_breakdown(&own, year).into_values().collect(),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassDrilldown {
    pub class_id: String,
    pub period: Option<PeriodFilter>,
    pub stats: AttendanceStats,
    pub students: Vec<StudentStatsRow>,
}

/// Top level of the drill-down: the whole class, then one row per student.
pub fn class_drilldown(
    records: &[AttendanceRecord],
    class_id: &str,
    class_roster: &[String],
    period: Option<PeriodFilter>,
) -> ClassDrilldown {
    let roster: HashSet<&str> = class_roster.iter().map(String::as_str).collect();
    let in_class: Vec<AttendanceRecord> = records
        .iter()
        .filter(|r| r.class_id == class_id && roster.contains(r.student_id.as_str()))
        .cloned()
        .collect();
    let scoped = apply_period(in_class, period);
    ClassDrilldown {
        class_id: class_id.to_string(),
        period,
        stats: compute_stats(&scoped),
        students: class_breakdown(&scoped, class_id, class_roster),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentDrilldown {
    pub student_id: String,
    pub class_id: String,
    pub period: Option<PeriodFilter>,
    pub period_label: Option<String>,
    pub stats: AttendanceStats,
    /// Only filled for a year window.
    pub monthly_breakdown: Vec<MonthlyAttendance>,
    pub records: Vec<AttendanceRecord>,
}

pub fn student_drilldown(
    records: &[AttendanceRecord],
    student_id: &str,
    class_id: &str,
    period: Option<PeriodFilter>,
) -> StudentDrilldown {
    let own: Vec<AttendanceRecord> = records
        .iter()
        .filter(|r| r.student_id == student_id && r.class_id == class_id)
        .cloned()
        .collect();
    let mut scoped = apply_period(own, period);
    sort_newest_first(&mut scoped);

    let monthly = match period {
        Some(PeriodFilter {
            period: Period::Year,
            anchor,
        }) => monthly_breakdown(&scoped, anchor.year()).into_values().collect(),
        _ => Vec::new(),
    };

    StudentDrilldown {
        student_id: student_id.to_string(),
        class_id: class_id.to_string(),
        period,
        period_label: period.map(|p| p.label()),
        stats: compute_stats(&scoped),
        monthly_breakdown: monthly,
        records: scoped,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassOverviewRow {
    pub class_id: String,
    pub name: String,
    pub section: String,
    pub student_count: usize,
    pub stats: AttendanceStats,
}

/// Every class side by side, best attendance first.
///
/// Only students currently on a class's roster count toward its stats; records
/// left behind by students who moved out of the class are skipped.
pub fn class_overview(
    records: &[AttendanceRecord],
    classes: &[(ClassInfo, Vec<String>)],
) -> Vec<ClassOverviewRow> {
    let mut rows: Vec<ClassOverviewRow> = classes
        .iter()
        .map(|(info, roster)| {
            let roster: HashSet<&str> = roster.iter().map(String::as_str).collect();
            let stats = compute_stats(
                records
                    .iter()
                    .filter(|r| r.class_id == info.id && roster.contains(r.student_id.as_str())),
            );
            ClassOverviewRow {
                class_id: info.id.clone(),
                name: info.name.clone(),
                section: info.section.clone(),
                student_count: roster.len(),
                stats,
            }
        })
        .collect();
    rows.sort_by(|a, b| by_percentage_desc(&a.stats, &b.stats).then_with(|| a.class_id.cmp(&b.class_id)));
    rows
}
