//! Store methods for the appraisal log. Append-only.

use super::{money_to_sql, AppraisalStore};
use crate::{engine::AppraisalReport, error::AppraisalResult, types::RecordId};
use rusqlite::params;

impl AppraisalStore {
    pub fn insert_appraisal(&self, report: &AppraisalReport) -> AppraisalResult<RecordId> {
        let payload = serde_json::to_string(report)?;
        let conn = self.conn();
        conn.execute(
            "INSERT INTO appraisal_log (
                garment_id, condition_code, policy_id,
                minimum, average, maximum, report_json, appraised_at
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                report.garment_id,
                report.condition_code,
                report.policy_id,
                money_to_sql(report.total.minimum),
                money_to_sql(report.total.average),
                money_to_sql(report.total.maximum),
                payload,
                report.appraised_at.timestamp_millis(),
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Logged reports for one garment, newest first.
    pub fn appraisals_for_garment(&self, garment_id: &str) -> AppraisalResult<Vec<AppraisalReport>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT report_json FROM appraisal_log
             WHERE garment_id = ?1
             ORDER BY appraised_at DESC, id DESC",
        )?;
        let payloads = stmt
            .query_map(params![garment_id], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        payloads
            .iter()
            .map(|p| -> AppraisalResult<AppraisalReport> { Ok(serde_json::from_str(p)?) })
            .collect()
    }

    pub fn appraisal_count(&self) -> AppraisalResult<i64> {
        let count: i64 = self.conn().query_row(
            "SELECT COUNT(*) FROM appraisal_log",
            [],
            |row| row.get(0),
        )?;
        Ok(count)
    }
}
