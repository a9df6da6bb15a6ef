//! Flat affine constraint systems.
//!
//! A [`FlatAffineConstraints`] is a conjunction of integer equalities
//! (`row . x == 0`) and inequalities (`row . x >= 0`) over identifiers laid
//! out as
//!
//! ```text
//! [ dims | symbols | locals | constant ]
//! ```
//!
//! - **Dimensions** are the identifiers a query is about (memref dimensions
//!   of a region, loop induction variables of a dependence).
//! - **Symbols** are parameters the answer may refer to.
//! - **Locals** are existentially quantified helpers introduced for
//!   `floordiv`/`mod` terms.
//!
//! Dimension and symbol ids may be bound to the IR value they stand for, so
//! loop bounds and access functions can be added by value.
//!
//! Projection uses Gaussian elimination through equalities and
//! Fourier–Motzkin elimination otherwise, with GCD tightening. The result is
//! the rational shadow tightened to integers where cheap, so emptiness
//! answers are sound ("empty" is a proof) but not complete.

mod bounds;
mod elimination;

pub use bounds::{BoundComparison, DimExtent, SliceBoundMaps};

use crate::error::{AnalysisError, AnalysisResult};
use loopnest_ir::{FlattenedMap, ValueId};
use std::fmt;

/// Inequality count beyond which Fourier–Motzkin gives up on an id and
/// drops its constraints instead (an over-approximation).
pub const DEFAULT_ROW_LIMIT: usize = 4096;

/// Kind of an identifier column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdKind {
    Dim,
    Symbol,
    Local,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlatAffineConstraints {
    num_dims: usize,
    num_symbols: usize,
    /// Value bound to each id; locals are always `None`.
    ids: Vec<Option<ValueId>>,
    equalities: Vec<Vec<i64>>,
    inequalities: Vec<Vec<i64>>,
    row_limit: usize,
}

impl Default for FlatAffineConstraints {
    fn default() -> Self {
        Self::new(0, 0, 0)
    }
}

impl FlatAffineConstraints {
    /// Unconstrained system with unbound ids.
    pub fn new(num_dims: usize, num_symbols: usize, num_locals: usize) -> Self {
        FlatAffineConstraints {
            num_dims,
            num_symbols,
            ids: vec![None; num_dims + num_symbols + num_locals],
            equalities: Vec::new(),
            inequalities: Vec::new(),
            row_limit: DEFAULT_ROW_LIMIT,
        }
    }

    /// Unconstrained system whose dims and symbols are bound to `values`
    /// (dims first).
    pub fn with_values(num_dims: usize, num_symbols: usize, values: &[ValueId]) -> Self {
        debug_assert_eq!(values.len(), num_dims + num_symbols);
        let mut cst = Self::new(num_dims, num_symbols, 0);
        for (slot, &v) in cst.ids.iter_mut().zip(values) {
            *slot = Some(v);
        }
        cst
    }

    pub fn with_row_limit(mut self, limit: usize) -> Self {
        self.row_limit = limit;
        self
    }

    // =========================================================================
    // Shape
    // =========================================================================

    #[inline]
    pub fn num_dims(&self) -> usize {
        self.num_dims
    }

    #[inline]
    pub fn num_symbols(&self) -> usize {
        self.num_symbols
    }

    #[inline]
    pub fn num_locals(&self) -> usize {
        self.ids.len() - self.num_dims - self.num_symbols
    }

    #[inline]
    pub fn num_ids(&self) -> usize {
        self.ids.len()
    }

    #[inline]
    pub fn num_dim_and_symbol_ids(&self) -> usize {
        self.num_dims + self.num_symbols
    }

    /// Row width, including the constant column.
    #[inline]
    pub fn num_cols(&self) -> usize {
        self.ids.len() + 1
    }

    #[inline]
    pub fn num_equalities(&self) -> usize {
        self.equalities.len()
    }

    #[inline]
    pub fn num_inequalities(&self) -> usize {
        self.inequalities.len()
    }

    #[inline]
    pub fn equality(&self, idx: usize) -> &[i64] {
        &self.equalities[idx]
    }

    #[inline]
    pub fn inequality(&self, idx: usize) -> &[i64] {
        &self.inequalities[idx]
    }

    pub fn id_kind(&self, pos: usize) -> IdKind {
        if pos < self.num_dims {
            IdKind::Dim
        } else if pos < self.num_dims + self.num_symbols {
            IdKind::Symbol
        } else {
            IdKind::Local
        }
    }

    // =========================================================================
    // Identifiers
    // =========================================================================

    /// Insert an id of `kind` at position `pos` within that kind, shifting
    /// later columns. Returns the absolute column.
    pub fn insert_id(&mut self, kind: IdKind, pos: usize, value: Option<ValueId>) -> usize {
        let abs = match kind {
            IdKind::Dim => {
                debug_assert!(pos <= self.num_dims);
                self.num_dims += 1;
                pos
            }
            IdKind::Symbol => {
                debug_assert!(pos <= self.num_symbols);
                self.num_symbols += 1;
                self.num_dims + pos
            }
            IdKind::Local => {
                debug_assert!(pos <= self.num_locals());
                self.num_dims + self.num_symbols + pos
            }
        };
        for row in self.equalities.iter_mut().chain(self.inequalities.iter_mut()) {
            row.insert(abs, 0);
        }
        self.ids.insert(abs, value);
        abs
    }

    pub fn append_dim_id(&mut self, value: Option<ValueId>) -> usize {
        self.insert_id(IdKind::Dim, self.num_dims, value)
    }

    pub fn append_symbol_id(&mut self, value: Option<ValueId>) -> usize {
        self.insert_id(IdKind::Symbol, self.num_symbols, value)
    }

    pub fn append_local_id(&mut self) -> usize {
        self.insert_id(IdKind::Local, self.num_locals(), None)
    }

    /// Remove column `pos` without projecting; constraints on it are lost.
    pub fn remove_id(&mut self, pos: usize) {
        match self.id_kind(pos) {
            IdKind::Dim => self.num_dims -= 1,
            IdKind::Symbol => self.num_symbols -= 1,
            IdKind::Local => {}
        }
        for row in self.equalities.iter_mut().chain(self.inequalities.iter_mut()) {
            row.remove(pos);
        }
        self.ids.remove(pos);
    }

    #[inline]
    pub fn id_value(&self, pos: usize) -> Option<ValueId> {
        self.ids[pos]
    }

    /// Values bound to ids `start..end`; unbound ids are skipped.
    pub fn id_values(&self, start: usize, end: usize) -> Vec<ValueId> {
        self.ids[start..end].iter().flatten().copied().collect()
    }

    /// Column of the dim or symbol bound to `value`.
    pub fn find_id(&self, value: ValueId) -> Option<usize> {
        self.ids[..self.num_dim_and_symbol_ids()]
            .iter()
            .position(|&v| v == Some(value))
    }

    /// Column of the symbol bound to `value`.
    pub fn find_symbol(&self, value: ValueId) -> Option<usize> {
        let start = self.num_dims;
        self.ids[start..self.num_dim_and_symbol_ids()]
            .iter()
            .position(|&v| v == Some(value))
            .map(|p| start + p)
    }

    #[inline]
    pub fn contains_id(&self, value: ValueId) -> bool {
        self.find_id(value).is_some()
    }

    /// Re-split dims and symbols so that the last `num_symbols` of them are
    /// symbols.
    pub fn set_dim_symbol_separation(&mut self, num_symbols: usize) {
        let total = self.num_dim_and_symbol_ids();
        assert!(num_symbols <= total, "more symbols than dims and symbols");
        self.num_dims = total - num_symbols;
        self.num_symbols = num_symbols;
    }

    // =========================================================================
    // Constraints
    // =========================================================================

    pub fn add_equality(&mut self, row: &[i64]) {
        assert_eq!(row.len(), self.num_cols(), "equality width mismatch");
        self.equalities.push(row.to_vec());
    }

    pub fn add_inequality(&mut self, row: &[i64]) {
        assert_eq!(row.len(), self.num_cols(), "inequality width mismatch");
        self.inequalities.push(row.to_vec());
    }

    /// `x_pos >= lb`.
    pub fn add_constant_lower_bound(&mut self, pos: usize, lb: i64) {
        let mut row = vec![0; self.num_cols()];
        row[pos] = 1;
        row[self.num_cols() - 1] = -lb;
        self.inequalities.push(row);
    }

    /// `x_pos <= ub`.
    pub fn add_constant_upper_bound(&mut self, pos: usize, ub: i64) {
        let mut row = vec![0; self.num_cols()];
        row[pos] = -1;
        row[self.num_cols() - 1] = ub;
        self.inequalities.push(row);
    }

    /// `x_pos == value`.
    pub fn set_id_to_constant(&mut self, pos: usize, value: i64) {
        let mut row = vec![0; self.num_cols()];
        row[pos] = 1;
        row[self.num_cols() - 1] = -value;
        self.equalities.push(row);
    }

    pub fn clear_constraints(&mut self) {
        self.equalities.clear();
        self.inequalities.clear();
    }

    /// Append a local `q = floor(dividend / divisor)` and its two defining
    /// inequalities. `dividend` is a row over the columns before the call.
    pub fn add_local_floor_div(&mut self, dividend: &[i64], divisor: i64) -> usize {
        debug_assert!(divisor > 0);
        debug_assert_eq!(dividend.len(), self.num_cols());
        let q = self.append_local_id();
        let mut row = dividend.to_vec();
        row.insert(q, 0);
        let last = row.len() - 1;

        // dividend - divisor * q >= 0
        let mut lower = row.clone();
        lower[q] = -divisor;
        // divisor * q - dividend + divisor - 1 >= 0
        let mut upper: Vec<i64> = row.iter().map(|c| -c).collect();
        upper[q] = divisor;
        upper[last] += divisor - 1;

        self.inequalities.push(lower);
        self.inequalities.push(upper);
        q
    }

    /// Lower the results of a flattened map into rows over this system.
    ///
    /// `operand_cols[k]` is the column standing for map input `k`. The
    /// map's locals are appended as local ids together with their defining
    /// constraints; the returned rows already include them.
    pub fn lower_flattened(&mut self, flat: &FlattenedMap, operand_cols: &[usize]) -> Vec<Vec<i64>> {
        let num_inputs = flat.num_dims + flat.num_symbols;
        debug_assert_eq!(operand_cols.len(), num_inputs);

        let mut local_cols = Vec::with_capacity(flat.num_locals());
        for local in &flat.locals {
            let mut dividend = vec![0; self.num_cols()];
            self.scatter(&local.dividend, num_inputs, operand_cols, &local_cols, &mut dividend);
            local_cols.push(self.add_local_floor_div(&dividend, local.divisor));
        }

        flat.results
            .iter()
            .map(|flat_row| {
                let mut row = vec![0; self.num_cols()];
                self.scatter(flat_row, num_inputs, operand_cols, &local_cols, &mut row);
                row
            })
            .collect()
    }

    /// Append the rows of `other`.
    ///
    /// Dim `i` of `other` maps to column `dim_cols[i]`; its symbols map to
    /// the symbols bound to the same values, appended when missing; its
    /// locals become fresh locals.
    pub fn append_constraints(&mut self, other: &Self, dim_cols: &[usize]) -> AnalysisResult<()> {
        debug_assert_eq!(dim_cols.len(), other.num_dims);
        let mut sym_cols = Vec::with_capacity(other.num_symbols);
        for s in other.num_dims..other.num_dim_and_symbol_ids() {
            let v = other.ids[s].ok_or(AnalysisError::IncompatibleRegions("unbound symbol"))?;
            let col = match self.find_symbol(v) {
                Some(col) => col,
                None => self.append_symbol_id(Some(v)),
            };
            sym_cols.push(col);
        }
        let local_cols: Vec<usize> = (0..other.num_locals())
            .map(|_| self.append_local_id())
            .collect();

        let width = self.num_cols();
        let col_of = |j: usize| -> usize {
            if j < other.num_dims {
                dim_cols[j]
            } else if j < other.num_dim_and_symbol_ids() {
                sym_cols[j - other.num_dims]
            } else if j < other.num_ids() {
                local_cols[j - other.num_dim_and_symbol_ids()]
            } else {
                width - 1
            }
        };
        let remap = |row: &Vec<i64>| -> Vec<i64> {
            let mut out = vec![0; width];
            for (j, &c) in row.iter().enumerate() {
                out[col_of(j)] += c;
            }
            out
        };
        let eqs: Vec<_> = other.equalities.iter().map(remap).collect();
        let ineqs: Vec<_> = other.inequalities.iter().map(remap).collect();
        self.equalities.extend(eqs);
        self.inequalities.extend(ineqs);
        Ok(())
    }

    /// Widen a row built before locals were appended, keeping the constant
    /// last.
    pub fn pad_row(&self, row: &mut Vec<i64>) {
        let missing = self.num_cols() - row.len();
        let last = row.len() - 1;
        for _ in 0..missing {
            row.insert(last, 0);
        }
    }

    fn scatter(
        &self,
        flat_row: &[i64],
        num_inputs: usize,
        operand_cols: &[usize],
        local_cols: &[usize],
        out: &mut [i64],
    ) {
        for (k, &col) in operand_cols.iter().enumerate() {
            out[col] += flat_row[k];
        }
        for (m, &col) in local_cols.iter().enumerate() {
            out[col] += flat_row[num_inputs + m];
        }
        let last = out.len() - 1;
        out[last] += flat_row[flat_row.len() - 1];
    }
}

impl fmt::Display for FlatAffineConstraints {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "constraints ({} dims, {} symbols, {} locals; {} eqs, {} ineqs)",
            self.num_dims,
            self.num_symbols,
            self.num_locals(),
            self.equalities.len(),
            self.inequalities.len()
        )?;
        write!(f, "  ids:")?;
        for id in &self.ids {
            match id {
                Some(v) => write!(f, " {}", v)?,
                None => write!(f, " _")?,
            }
        }
        writeln!(f)?;
        for row in &self.equalities {
            writeln!(f, "  {:?} = 0", row)?;
        }
        for row in &self.inequalities {
            writeln!(f, "  {:?} >= 0", row)?;
        }
        Ok(())
    }
}
