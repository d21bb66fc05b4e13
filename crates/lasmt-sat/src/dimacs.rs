//! DIMACS CNF reader.
//!
//! Accepts `c` comment lines, one `p cnf <vars> <clauses>` header, and
//! clauses of signed literals terminated by `0`, possibly spanning lines.
//! Two comment forms written by split dumps carry theory data after the
//! header: `c sort <index> <Int|Real>` and `c atom <literal> <inequality>`.

use lasmt_core::{CoreError, CoreResult, Inequality, Literal, Sort, Variable};

use crate::solver::Solver;

/// A parsed CNF formula.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DimacsFormula {
    /// Declared number of variables
    pub num_vars: usize,
    /// Clauses in input order
    pub clauses: Vec<Vec<Literal>>,
    /// Arithmetic variable sorts from `c sort` lines
    pub sorts: Vec<Sort>,
    /// Theory atoms from `c atom` lines
    pub atoms: Vec<(Variable, Inequality)>,
}

impl DimacsFormula {
    /// A pure SAT solver loaded with the clauses. Atoms and sorts are ignored.
    pub fn into_solver(self) -> Solver {
        let mut solver = Solver::new(self.num_vars);
        for clause in self.clauses {
            if !solver.add_clause(clause) {
                break;
            }
        }
        solver
    }
}

fn error(line: usize, message: impl Into<String>) -> CoreError {
    CoreError::Dimacs {
        line,
        message: message.into(),
    }
}

fn parse_sort(line_no: usize, rest: &str, sorts: &mut Vec<Sort>) -> CoreResult<()> {
    let (index, sort) = rest
        .split_once(' ')
        .ok_or_else(|| error(line_no, "expected `c sort <index> <sort>`"))?;
    if index.parse::<usize>().ok() != Some(sorts.len()) {
        return Err(error(line_no, format!("sort index {index} out of order")));
    }
    let sort = sort
        .trim()
        .parse()
        .map_err(|e| error(line_no, format!("{e}")))?;
    sorts.push(sort);
    Ok(())
}

fn parse_atom(line_no: usize, rest: &str, max_var: usize) -> CoreResult<(Variable, Inequality)> {
    let (lit, ineq) = rest
        .split_once(' ')
        .ok_or_else(|| error(line_no, "expected `c atom <literal> <inequality>`"))?;
    let var = lit
        .parse::<i64>()
        .ok()
        .filter(|&v| v > 0)
        .and_then(Literal::from_dimacs)
        .map(Literal::variable)
        .filter(|v| v.index() < max_var)
        .ok_or_else(|| error(line_no, format!("bad atom variable `{lit}`")))?;
    let ineq = ineq
        .trim()
        .parse()
        .map_err(|e| error(line_no, format!("{e}")))?;
    Ok((var, ineq))
}

/// Parse DIMACS text.
pub fn parse_str(input: &str) -> CoreResult<DimacsFormula> {
    let mut num_vars: Option<usize> = None;
    let mut clauses = Vec::new();
    let mut sorts = Vec::new();
    let mut atoms = Vec::new();
    let mut current = Vec::new();
    let mut last_line = 0;

    for (i, raw) in input.lines().enumerate() {
        let line_no = i + 1;
        last_line = line_no;
        let line = raw.trim();
        if let Some(rest) = line.strip_prefix("c sort ") {
            if num_vars.is_none() {
                return Err(error(line_no, "sort before header"));
            }
            parse_sort(line_no, rest, &mut sorts)?;
            continue;
        }
        if let Some(rest) = line.strip_prefix("c atom ") {
            let Some(max_var) = num_vars else {
                return Err(error(line_no, "atom before header"));
            };
            atoms.push(parse_atom(line_no, rest, max_var)?);
            continue;
        }
        if line.is_empty() || line.starts_with('c') || line.starts_with('%') {
            continue;
        }
        if let Some(header) = line.strip_prefix('p') {
            if num_vars.is_some() {
                return Err(error(line_no, "duplicate header"));
            }
            let fields: Vec<&str> = header.split_whitespace().collect();
            match fields.as_slice() {
                ["cnf", vars, _clauses] => {
                    let vars = vars
                        .parse::<usize>()
                        .map_err(|e| error(line_no, format!("bad variable count: {e}")))?;
                    num_vars = Some(vars);
                }
                _ => return Err(error(line_no, "expected `p cnf <vars> <clauses>`")),
            }
            continue;
        }
        let Some(max_var) = num_vars else {
            return Err(error(line_no, "clause before header"));
        };
        for token in line.split_whitespace() {
            let value = token
                .parse::<i64>()
                .map_err(|e| error(line_no, format!("bad literal `{token}`: {e}")))?;
            if value == 0 {
                clauses.push(std::mem::take(&mut current));
                continue;
            }
            match Literal::from_dimacs(value) {
                Some(lit) if lit.variable().index() < max_var => current.push(lit),
                _ => {
                    return Err(error(
                        line_no,
                        format!("literal {value} exceeds declared {max_var} variables"),
                    ))
                }
            }
        }
    }
    if !current.is_empty() {
        return Err(error(last_line, "unterminated clause"));
    }
    Ok(DimacsFormula {
        num_vars: num_vars.unwrap_or(0),
        clauses,
        sorts,
        atoms,
    })
}
