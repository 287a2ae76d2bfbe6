//! A small mixed 0-1 linear program representation.
//!
//! Only what schedule compaction needs: binary and non-negative continuous
//! columns, `<=`/`=`/`>=` rows and a linear objective to minimise. Models
//! render to CPLEX LP text so they can be handed to an external solver.

use std::fmt::Write as _;

/// Column kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarKind {
    Binary,
    /// Non-negative real.
    Continuous,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Variable {
    pub name: String,
    pub kind: VarKind,
}

/// Row sense.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sense {
    Le,
    Eq,
    Ge,
}

impl Sense {
    fn symbol(self) -> &'static str {
        match self {
            Sense::Le => "<=",
            Sense::Eq => "=",
            Sense::Ge => ">=",
        }
    }
}

/// `Σ coefficient × column  sense  rhs`.
#[derive(Debug, Clone, PartialEq)]
pub struct Constraint {
    pub name: String,
    pub terms: Vec<(usize, f64)>,
    pub sense: Sense,
    pub rhs: f64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct IlpModel {
    pub variables: Vec<Variable>,
    pub constraints: Vec<Constraint>,
    /// Minimised.
    pub objective: Vec<(usize, f64)>,
}

/// Column values of a solution, indexed like `IlpModel::variables`.
#[derive(Debug, Clone, PartialEq)]
pub struct Assignment {
    pub values: Vec<f64>,
    pub objective: f64,
}

impl Assignment {
    pub fn is_set(&self, column: usize) -> bool {
        self.values.get(column).is_some_and(|v| *v > 0.5)
    }
}

/// What a solve produced.
#[derive(Debug, Clone, PartialEq)]
pub enum SolveOutcome {
    Feasible(Assignment),
    Infeasible,
    Timeout,
}

impl IlpModel {
    pub fn add_variable(&mut self, name: impl Into<String>, kind: VarKind) -> usize {
        self.variables.push(Variable {
            name: name.into(),
            kind,
        });
        self.variables.len() - 1
    }

    pub fn add_constraint(&mut self, name: impl Into<String>, terms: Vec<(usize, f64)>, sense: Sense, rhs: f64) {
        self.constraints.push(Constraint {
            name: name.into(),
            terms,
            sense,
            rhs,
        });
    }

    pub fn binary_count(&self) -> usize {
        self.variables.iter().filter(|v| v.kind == VarKind::Binary).count()
    }

    /// Render in CPLEX LP format.
    pub fn to_lp_string(&self) -> String {
        let mut out = String::new();
        out.push_str("Minimize\n obj:");
        self.write_terms(&mut out, &self.objective);
        out.push_str("\nSubject To\n");
        for row in &self.constraints {
            let _ = write!(out, " {}:", row.name);
            self.write_terms(&mut out, &row.terms);
            let _ = writeln!(out, " {} {}", row.sense.symbol(), number(row.rhs));
        }
        let binaries: Vec<&str> = self
            .variables
            .iter()
            .filter(|v| v.kind == VarKind::Binary)
            .map(|v| v.name.as_str())
            .collect();
        if !binaries.is_empty() {
            out.push_str("Binary\n");
            for chunk in binaries.chunks(8) {
                let _ = writeln!(out, " {}", chunk.join(" "));
            }
        }
        out.push_str("End\n");
        out
    }

    fn write_terms(&self, out: &mut String, terms: &[(usize, f64)]) {
        if terms.is_empty() {
            out.push_str(" 0");
            return;
        }
        for (i, (column, coefficient)) in terms.iter().enumerate() {
            let name = &self.variables[*column].name;
            let sign = if *coefficient < 0.0 {
                " -"
            } else if i == 0 {
                ""
            } else {
                " +"
            };
            let magnitude = coefficient.abs();
            if (magnitude - 1.0).abs() < f64::EPSILON {
                let _ = write!(out, "{sign} {name}");
            } else {
                let _ = write!(out, "{sign} {} {name}", number(magnitude));
            }
        }
    }
}

/// Integral values without a trailing `.0`.
fn number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{value}")
    }
}
