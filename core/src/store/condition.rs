//! Store methods for condition modifier lists (current + history).

use super::{date_column, instant_column, money_column, money_to_sql, AppraisalStore};
use crate::{
    condition::{ArchivedConditionModifierList, ConditionModifier, ConditionModifierList},
    error::{AppraisalError, AppraisalResult},
    types::RecordId,
};
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, Connection, Row};
use std::collections::BTreeSet;

struct ListHeader {
    id:           RecordId,
    last_updated: DateTime<Utc>,
    source_date:  NaiveDate,
}

impl ListHeader {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id:           row.get(0)?,
            last_updated: instant_column(row, 1)?,
            source_date:  date_column(row, 2)?,
        })
    }
}

fn modifier_from_row(row: &Row<'_>) -> rusqlite::Result<ConditionModifier> {
    Ok(ConditionModifier {
        condition_code: row.get(0)?,
        factor:         money_column(row, 1)?,
    })
}

fn current_modifiers(conn: &Connection, list_id: RecordId) -> rusqlite::Result<BTreeSet<ConditionModifier>> {
    let mut stmt = conn.prepare(
        "SELECT condition_code, factor FROM condition_modifier
         WHERE list_id = ?1 ORDER BY condition_code ASC",
    )?;
    let modifiers = stmt
        .query_map(params![list_id], modifier_from_row)?
        .collect::<Result<BTreeSet<_>, _>>()?;
    Ok(modifiers)
}

fn archived_modifiers(conn: &Connection, history_id: RecordId) -> rusqlite::Result<BTreeSet<ConditionModifier>> {
    let mut stmt = conn.prepare(
        "SELECT condition_code, factor FROM condition_modifier_history
         WHERE history_id = ?1 ORDER BY condition_code ASC",
    )?;
    let modifiers = stmt
        .query_map(params![history_id], modifier_from_row)?
        .collect::<Result<BTreeSet<_>, _>>()?;
    Ok(modifiers)
}

fn load_current(conn: &Connection, where_clause: &str, args: &[i64]) -> rusqlite::Result<Vec<ConditionModifierList>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT id, last_updated, source_date FROM condition_modifier_list
         {where_clause} ORDER BY last_updated DESC, id DESC"
    ))?;
    let headers = stmt
        .query_map(rusqlite::params_from_iter(args.iter()), ListHeader::from_row)?
        .collect::<Result<Vec<_>, _>>()?;

    headers
        .into_iter()
        .map(|h| -> rusqlite::Result<ConditionModifierList> {
            Ok(ConditionModifierList {
                id:           Some(h.id),
                last_updated: Some(h.last_updated),
                source_date:  h.source_date,
                modifiers:    current_modifiers(conn, h.id)?,
            })
        })
        .collect()
}

fn load_archived(conn: &Connection, where_clause: &str, args: &[i64]) -> rusqlite::Result<Vec<ArchivedConditionModifierList>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT id, original_id, last_updated, source_date, archived_at
         FROM condition_modifier_list_history
         {where_clause} ORDER BY archived_at DESC, id DESC"
    ))?;
    let rows = stmt
        .query_map(rusqlite::params_from_iter(args.iter()), |row| {
            Ok((
                row.get::<_, RecordId>(0)?,
                row.get::<_, RecordId>(1)?,
                instant_column(row, 2)?,
                date_column(row, 3)?,
                instant_column(row, 4)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    rows.into_iter()
        .map(|(history_id, original_id, last_updated, source_date, archived_at)|
            -> rusqlite::Result<ArchivedConditionModifierList> {
            Ok(ArchivedConditionModifierList {
                history_id,
                list: ConditionModifierList {
                    id:           Some(original_id),
                    last_updated: Some(last_updated),
                    source_date,
                    modifiers:    archived_modifiers(conn, history_id)?,
                },
                archived_at,
            })
        })
        .collect()
}

fn insert_list(conn: &Connection, list: &ConditionModifierList, last_updated: DateTime<Utc>) -> rusqlite::Result<RecordId> {
    conn.execute(
        "INSERT INTO condition_modifier_list (last_updated, source_date) VALUES (?1, ?2)",
        params![last_updated.timestamp_millis(), list.source_date.to_string()],
    )?;
    let list_id = conn.last_insert_rowid();
    let mut stmt = conn.prepare(
        "INSERT INTO condition_modifier (list_id, condition_code, factor) VALUES (?1, ?2, ?3)",
    )?;
    for m in &list.modifiers {
        stmt.execute(params![list_id, m.condition_code, money_to_sql(m.factor)])?;
    }
    Ok(list_id)
}

/// Copy one current list, unchanged, into the history tables.
fn archive_list(conn: &Connection, list_id: RecordId, archived_at: DateTime<Utc>) -> rusqlite::Result<RecordId> {
    conn.execute(
        "INSERT INTO condition_modifier_list_history (original_id, last_updated, source_date, archived_at)
         SELECT id, last_updated, source_date, ?2 FROM condition_modifier_list WHERE id = ?1",
        params![list_id, archived_at.timestamp_millis()],
    )?;
    let history_id = conn.last_insert_rowid();
    conn.execute(
        "INSERT INTO condition_modifier_history (history_id, condition_code, factor)
         SELECT ?2, condition_code, factor FROM condition_modifier WHERE list_id = ?1",
        params![list_id, history_id],
    )?;
    Ok(history_id)
}

impl AppraisalStore {
    /// Every row of the current table. More than one is corruption; the
    /// caller decides how to report it.
    pub fn current_condition_lists(&self) -> AppraisalResult<Vec<ConditionModifierList>> {
        Ok(load_current(&self.conn(), "", &[])?)
    }

    pub fn condition_lists_updated_between(
        &self,
        start_millis: i64,
        end_millis:   i64,
    ) -> AppraisalResult<Vec<ConditionModifierList>> {
        Ok(load_current(
            &self.conn(),
            "WHERE last_updated BETWEEN ?1 AND ?2",
            &[start_millis, end_millis],
        )?)
    }

    pub fn archived_condition_lists_updated_between(
        &self,
        start_millis: i64,
        end_millis:   i64,
    ) -> AppraisalResult<Vec<ArchivedConditionModifierList>> {
        Ok(load_archived(
            &self.conn(),
            "WHERE last_updated BETWEEN ?1 AND ?2",
            &[start_millis, end_millis],
        )?)
    }

    pub fn archived_condition_lists(&self) -> AppraisalResult<Vec<ArchivedConditionModifierList>> {
        Ok(load_archived(&self.conn(), "", &[])?)
    }

    /// Insert a list into the current table WITHOUT archiving what is
    /// already there. Registries use `replace_current_condition_list`;
    /// this exists for bulk loads and corruption drills.
    pub fn insert_condition_list(
        &self,
        list:         &ConditionModifierList,
        last_updated: DateTime<Utc>,
    ) -> AppraisalResult<RecordId> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        let id = insert_list(&tx, list, last_updated)?;
        tx.commit()?;
        Ok(id)
    }

    /// Atomically: archive the current list (if any), delete it, insert
    /// `list` as current with `last_updated = now`.
    ///
    /// Aborts without changes when more than one current list exists.
    pub fn replace_current_condition_list(
        &self,
        list: &ConditionModifierList,
        now:  DateTime<Utc>,
    ) -> AppraisalResult<ConditionModifierList> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;

        let current_ids: Vec<RecordId> = {
            let mut stmt = tx.prepare("SELECT id FROM condition_modifier_list")?;
            let ids = stmt
                .query_map([], |row| row.get(0))?
                .collect::<Result<Vec<_>, _>>()?;
            ids
        };
        if current_ids.len() > 1 {
            // Dropping `tx` rolls back.
            return Err(AppraisalError::MultipleCurrentConditionLists {
                count: current_ids.len(),
            });
        }

        for old_id in &current_ids {
            let history_id = archive_list(&tx, *old_id, now)?;
            tx.execute("DELETE FROM condition_modifier WHERE list_id = ?1", params![old_id])?;
            tx.execute("DELETE FROM condition_modifier_list WHERE id = ?1", params![old_id])?;
            log::debug!("condition modifiers: list {old_id} archived as history {history_id}");
        }

        let new_id = insert_list(&tx, list, now)?;
        let installed = load_current(&tx, "WHERE id = ?1", &[new_id])?
            .pop()
            .ok_or_else(|| AppraisalError::CorruptRecord(format!(
                "condition_modifier_list row {new_id} vanished inside its own transaction"
            )))?;
        tx.commit()?;
        Ok(installed)
    }

    pub fn archived_condition_list_count(&self) -> AppraisalResult<i64> {
        let count: i64 = self.conn().query_row(
            "SELECT COUNT(*) FROM condition_modifier_list_history",
            [],
            |row| row.get(0),
        )?;
        Ok(count)
    }
}
