// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//    http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//! `rusqlite`-backed [`super::GroundTruthSink`]: the exact schema,
//! insert batching and read pagination of the upstream ground-truth
//! store.
use std::path::Path;

use rusqlite::{params_from_iter, types::Value, Connection};

use crate::error::{GtError, GtResult};
use crate::groundtruth::{FunctionRange, GroundTruth};
use crate::matcher::InstructionSupplement;

/// Bound on value-rows per prepared INSERT: the sqlite3 driver this
/// was grounded on rejects statements with too many bound parameters.
const MAX_SQL_VALS: usize = 100;
/// Bound on rows per paginated SELECT.
const MAX_SQL_QUERY: i64 = 50_000;

pub struct SqliteSink;

fn sql_err(e: rusqlite::Error) -> GtError {
    GtError::StructuralFail(format!("sqlite: {e}"))
}

impl super::GroundTruthSink for SqliteSink {
    fn write(&self, path: &Path, ground_truth: &GroundTruth) -> GtResult<()> {
        create(path, ground_truth)
    }
}

fn supplementary_json(s: &InstructionSupplement) -> String {
    if s.optional {
        "{\"Optional\":true}".to_string()
    } else {
        String::new()
    }
}

/// Create (overwriting) an sqlite file with the `insn`/`func`/
/// `func2insns` tables populated from `ground_truth`.
pub fn create(path: &Path, ground_truth: &GroundTruth) -> GtResult<()> {
    let _ = std::fs::remove_file(path);
    let conn = Connection::open(path).map_err(sql_err)?;

    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS insn (offset INTEGER PRIMARY KEY, supplementary TEXT);
         CREATE TABLE IF NOT EXISTS func (id INTEGER PRIMARY KEY AUTOINCREMENT, name TEXT, start INTEGER, end INTEGER);
         CREATE TABLE IF NOT EXISTS func2insns (id INTEGER PRIMARY KEY AUTOINCREMENT, fid INTEGER, insn INTEGER);",
    )
    .map_err(sql_err)?;

    let mut instructions: Vec<(u64, &InstructionSupplement)> =
        ground_truth.instructions.iter().map(|(&off, supp)| (off, supp)).collect();
    instructions.sort_by_key(|(off, _)| *off);

    for chunk in instructions.chunks(MAX_SQL_VALS) {
        let placeholders = vec!["(?, ?)"; chunk.len()].join(",");
        let sql = format!("INSERT INTO insn (offset, supplementary) VALUES {placeholders}");
        let mut values = Vec::with_capacity(chunk.len() * 2);
        for (offset, supp) in chunk {
            values.push(Value::Integer(*offset as i64));
            values.push(Value::Text(supplementary_json(supp)));
        }
        conn.execute(&sql, params_from_iter(values)).map_err(sql_err)?;
    }

    let mut functions: Vec<&(FunctionRange, Vec<u64>)> = ground_truth.functions.iter().collect();
    functions.sort_by_key(|(range, _)| range.start_virtual);

    for (batch_start, chunk) in functions.chunks(MAX_SQL_VALS).enumerate() {
        let placeholders = vec!["(?, ?, ?, ?)"; chunk.len()].join(",");
        let sql = format!("INSERT INTO func (id, name, start, end) VALUES {placeholders}");
        let mut values = Vec::with_capacity(chunk.len() * 4);
        for (i, (range, _)) in chunk.iter().enumerate() {
            let id = batch_start * MAX_SQL_VALS + i;
            values.push(Value::Integer(id as i64));
            values.push(Value::Text(range.name.clone()));
            values.push(Value::Integer(range.start_virtual as i64));
            values.push(Value::Integer(range.end_virtual as i64));
        }
        conn.execute(&sql, params_from_iter(values)).map_err(sql_err)?;
    }

    let mut pairs: Vec<(usize, u64)> = Vec::new();
    for (fid, (_, offsets)) in functions.iter().enumerate() {
        let mut sorted_offsets = offsets.clone();
        sorted_offsets.sort_unstable();
        for off in sorted_offsets {
            pairs.push((fid, off));
        }
    }
    for chunk in pairs.chunks(MAX_SQL_VALS) {
        let placeholders = vec!["(?, ?)"; chunk.len()].join(",");
        let sql = format!("INSERT INTO func2insns (fid, insn) VALUES {placeholders}");
        let mut values = Vec::with_capacity(chunk.len() * 2);
        for (fid, insn) in chunk {
            values.push(Value::Integer(*fid as i64));
            values.push(Value::Integer(*insn as i64));
        }
        conn.execute(&sql, params_from_iter(values)).map_err(sql_err)?;
    }

    Ok(())
}

/// Read back a ground-truth store: the full `offset → supplementary`
/// map and the set of function ranges (without their instruction
/// lists, matching the upstream reader's contract).
pub fn read(path: &Path) -> GtResult<(std::collections::HashMap<u64, InstructionSupplement>, Vec<FunctionRange>)> {
    let conn = Connection::open(path).map_err(sql_err)?;

    let mut instructions = std::collections::HashMap::new();
    let insn_count: i64 = conn
        .query_row("SELECT COUNT(*) FROM insn", [], |row| row.get(0))
        .map_err(sql_err)?;
    let mut offset = 0;
    while offset < insn_count {
        let mut stmt = conn
            .prepare("SELECT offset, supplementary FROM insn LIMIT ?1 OFFSET ?2")
            .map_err(sql_err)?;
        let rows = stmt
            .query_map([MAX_SQL_QUERY, offset], |row| {
                let off: i64 = row.get(0)?;
                let supp: String = row.get(1)?;
                Ok((off as u64, supp))
            })
            .map_err(sql_err)?;
        for row in rows {
            let (off, supp) = row.map_err(sql_err)?;
            instructions.insert(off, InstructionSupplement { optional: supp.contains("Optional") });
        }
        offset += MAX_SQL_QUERY;
    }

    let mut functions = Vec::new();
    let func_count: i64 = conn
        .query_row("SELECT COUNT(*) FROM func", [], |row| row.get(0))
        .map_err(sql_err)?;
    let mut offset = 0;
    while offset < func_count {
        let mut stmt = conn
            .prepare("SELECT name, start, end FROM func LIMIT ?1 OFFSET ?2")
            .map_err(sql_err)?;
        let rows = stmt
            .query_map([MAX_SQL_QUERY, offset], |row| {
                let name: String = row.get(0)?;
                let start: i64 = row.get(1)?;
                let end: i64 = row.get(2)?;
                Ok(FunctionRange { name, start_virtual: start as u64, end_virtual: end as u64 })
            })
            .map_err(sql_err)?;
        for row in rows {
            functions.push(row.map_err(sql_err)?);
        }
        offset += MAX_SQL_QUERY;
    }

    Ok((instructions, functions))
}
