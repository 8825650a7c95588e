///
/// Statement cursor.
///
/// Drives one compiled statement through its execution pass:
///
/// ```text
///   Ready --step--> Row --step--> Row ... --step--> Done
///     |               |
///     +--busy---------+--> (unchanged, step again)
///     +--error--------+--> Failed
/// ```
///
/// `Done` and `Failed` are terminal for the pass. Stepping a finished cursor
/// returns `Done` again without touching the engine (which would otherwise
/// silently restart the statement), and stepping a failed cursor repeats the
/// failure. `reset` starts a new pass and keeps bound parameters.
///
/// Column names are read on the first row of each pass and shared by every
/// row of that pass.
///

use std::sync::Arc;

use rusqlite::ffi;
use tracing::trace;

use crate::codec::{self, Value};
use crate::config::CodecConfig;
use crate::error::{Error, Result};
use crate::raw::{status_error, RawStatement};

/// One decoded row. `names` and `values` are positionally aligned.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    pub names: Arc<[String]>,
    pub values: Vec<Value>,
}

impl Row {
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Value of the first column called `name`
    pub fn get(&self, name: &str) -> Option<&Value> {
        let index = self.names.iter().position(|n| n == name)?;
        self.values.get(index)
    }
}

/// Outcome of one `step`
#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    /// A row is available. `None` when the statement yields no columns.
    Row(Option<Row>),
    /// The pass is finished.
    Done,
    /// The engine could not take a lock; stepping again may succeed.
    Busy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorState {
    Ready,
    Row,
    Done,
    Failed,
}

pub struct Cursor {
    raw: RawStatement,
    codec: CodecConfig,
    state: CursorState,
    names: Option<Arc<[String]>>,
    failure: Option<i32>,
}

impl Cursor {
    pub fn new(raw: RawStatement, codec: CodecConfig) -> Self {
        Self {
            raw,
            codec,
            state: CursorState::Ready,
            names: None,
            failure: None,
        }
    }

    pub fn raw(&self) -> &RawStatement {
        &self.raw
    }

    pub fn codec(&self) -> &CodecConfig {
        &self.codec
    }

    pub fn state(&self) -> CursorState {
        self.state
    }

    pub fn step(&mut self) -> Result<Step> {
        match self.state {
            CursorState::Done => return Ok(Step::Done),
            CursorState::Failed => return Err(self.repeat_failure()),
            CursorState::Ready | CursorState::Row => {}
        }

        let code = self.raw.step();
        match code {
            ffi::SQLITE_ROW => {
                self.state = CursorState::Row;
                let row = self.read_row()?;
                trace!(columns = row.as_ref().map_or(0, Row::len), "step row");
                Ok(Step::Row(row))
            }
            ffi::SQLITE_DONE => {
                trace!("step done");
                self.state = CursorState::Done;
                Ok(Step::Done)
            }
            ffi::SQLITE_BUSY => {
                trace!("step busy");
                Ok(Step::Busy)
            }
            code => {
                let err = status_error(code);
                trace!(code, error = %err, "step failed");
                self.state = CursorState::Failed;
                self.failure = Some(code);
                Err(err)
            }
        }
    }

    /// Start a new pass. Bindings are kept.
    pub fn reset(&mut self) {
        // sqlite3_reset echoes the last step error; the pass is restarted
        // regardless, so that code is not a reset failure.
        self.raw.reset();
        self.state = CursorState::Ready;
        self.names = None;
        self.failure = None;
    }

    pub fn clear_bindings(&mut self) -> Result<()> {
        let code = self.raw.clear_bindings();
        if code == ffi::SQLITE_OK {
            Ok(())
        } else {
            Err(status_error(code))
        }
    }

    fn read_row(&mut self) -> Result<Option<Row>> {
        let count = self.raw.column_count();
        if count == 0 {
            return Ok(None);
        }
        let names = match &self.names {
            Some(names) => Arc::clone(names),
            None => {
                let names: Arc<[String]> = (0..count).map(|i| self.raw.column_name(i)).collect();
                self.names = Some(Arc::clone(&names));
                names
            }
        };
        let values = (0..count)
            .map(|i| codec::decode_column(&self.raw, i, &self.codec))
            .collect::<Result<Vec<_>>>()?;
        Ok(Some(Row { names, values }))
    }

    fn repeat_failure(&self) -> Error {
        status_error(self.failure.unwrap_or(ffi::SQLITE_MISUSE))
    }
}
