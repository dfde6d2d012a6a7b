use rusqlite::{params, Connection};
use tracing::debug;

use crate::db::StoredRow;
use crate::error::AppResult;

pub fn list_referrals(conn: &Connection) -> AppResult<Vec<StoredRow>> {
    let mut stmt = conn.prepare(
        "SELECT referred_person, referral_source, month, batch_id
         FROM referrals
         ORDER BY ordinal",
    )?;

    let rows = stmt
        .query_map([], |row| {
            Ok(StoredRow {
                referred_person: row.get::<_, Option<String>>(0)?.unwrap_or_default(),
                referral_source: row.get(1)?,
                month: row.get(2)?,
                batch_id: row.get(3)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(rows)
}

/// Replace the whole table with `rows` in one transaction.
pub fn replace_referrals(conn: &mut Connection, rows: &[StoredRow]) -> AppResult<usize> {
    let tx = conn.transaction()?;
    let removed = tx.execute("DELETE FROM referrals", [])?;

    {
        let mut stmt = tx.prepare(
            "INSERT INTO referrals (ordinal, referred_person, referral_source, month, batch_id)
             VALUES (?1, ?2, ?3, ?4, ?5)",
        )?;
        for (ordinal, row) in rows.iter().enumerate() {
            stmt.execute(params![
                ordinal as i64,
                row.referred_person,
                row.referral_source,
                row.month,
                row.batch_id,
            ])?;
        }
    }

    tx.commit()?;
    debug!(removed, inserted = rows.len(), "Replaced referrals table");
    Ok(rows.len())
}
