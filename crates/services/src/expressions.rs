//! Random arithmetic sheets.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use drill_core::model::{QuestionItem, QuestionSet, QuestionSetId};

use crate::error::ExpressionError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Add,
    Subtract,
    Multiply,
    Divide,
}

impl Operator {
    pub const ALL: [Operator; 4] = [
        Operator::Add,
        Operator::Subtract,
        Operator::Multiply,
        Operator::Divide,
    ];

    #[must_use]
    pub fn symbol(self) -> char {
        match self {
            Operator::Add => '+',
            Operator::Subtract => '-',
            Operator::Multiply => '×',
            Operator::Divide => '÷',
        }
    }
}

/// Shape of the generated items.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpressionSpec {
    pub operators: Vec<Operator>,
    /// Fewest digits in an operand (and in a quotient).
    pub min_digits: u32,
    pub max_digits: u32,
}

impl Default for ExpressionSpec {
    fn default() -> Self {
        Self {
            operators: Operator::ALL.to_vec(),
            min_digits: 1,
            max_digits: 2,
        }
    }
}

/// Builds question sets of random expressions.
///
/// Subtraction never goes negative and division always divides exactly, so
/// every correct answer is a non-negative integer.
pub struct ExpressionGenerator {
    spec: ExpressionSpec,
    rng: StdRng,
}

impl ExpressionGenerator {
    /// Create a generator. A seed makes the output reproducible.
    ///
    /// # Errors
    ///
    /// Returns `ExpressionError` if no operators are given or the digit range
    /// is empty or wider than 1..=9.
    pub fn new(spec: ExpressionSpec, seed: Option<u64>) -> Result<Self, ExpressionError> {
        if spec.operators.is_empty() {
            return Err(ExpressionError::NoOperators);
        }
        if spec.min_digits == 0 || spec.min_digits > spec.max_digits || spec.max_digits > 9 {
            return Err(ExpressionError::InvalidDigits {
                min: spec.min_digits,
                max: spec.max_digits,
            });
        }
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::seed_from_u64(rand::random()),
        };
        Ok(Self { spec, rng })
    }

    /// Draw one item.
    pub fn next_item(&mut self) -> QuestionItem {
        let index = self.rng.random_range(0..self.spec.operators.len());
        let op = self.spec.operators[index];
        let a = self.operand();
        let b = self.operand();
        let (lhs, rhs, answer) = match op {
            Operator::Add => (a, b, a + b),
            Operator::Subtract => {
                let (hi, lo) = if a >= b { (a, b) } else { (b, a) };
                (hi, lo, hi - lo)
            }
            Operator::Multiply => (a, b, a * b),
            // `a` is the quotient, so the dividend is built rather than drawn.
            Operator::Divide => (a * b, b, a),
        };
        QuestionItem::new(format!("{lhs} {} {rhs}", op.symbol()), answer)
    }

    /// Build a whole sheet of `count` items.
    ///
    /// # Errors
    ///
    /// Returns `ExpressionError::QuestionSet` if the name is blank or `count`
    /// is zero.
    pub fn question_set(
        &mut self,
        id: QuestionSetId,
        name: impl Into<String>,
        count: usize,
    ) -> Result<QuestionSet, ExpressionError> {
        let items = (0..count).map(|_| self.next_item()).collect();
        Ok(QuestionSet::new(id, name, items)?)
    }

    fn operand(&mut self) -> i64 {
        let digits = self
            .rng
            .random_range(self.spec.min_digits..=self.spec.max_digits);
        let low = if digits == 1 { 1 } else { 10_i64.pow(digits - 1) };
        let high = 10_i64.pow(digits) - 1;
        self.rng.random_range(low..=high)
    }
}
