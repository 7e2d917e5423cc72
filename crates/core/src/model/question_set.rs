use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::ids::QuestionSetId;

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum QuestionSetError {
    #[error("question set name cannot be empty")]
    EmptyName,

    #[error("question set must contain at least one item")]
    NoItems,

    #[error("item {index} has an empty expression")]
    EmptyExpression { index: usize },
}

//
// ─── QUESTION SET ──────────────────────────────────────────────────────────────
//

/// One authored `{expression, correct_answer}` pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionItem {
    pub expression: String,
    pub correct_answer: i64,
}

impl QuestionItem {
    #[must_use]
    pub fn new(expression: impl Into<String>, correct_answer: i64) -> Self {
        Self {
            expression: expression.into(),
            correct_answer,
        }
    }
}

/// An ordered, named list of expressions (a practice sheet).
///
/// Item order is significant: it becomes question numbering when a test is
/// generated from the set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionSet {
    id: QuestionSetId,
    name: String,
    items: Vec<QuestionItem>,
}

impl QuestionSet {
    /// Build a validated question set.
    ///
    /// # Errors
    ///
    /// Returns `QuestionSetError` if the name is blank, there are no items, or
    /// an item has a blank expression.
    pub fn new(
        id: QuestionSetId,
        name: impl Into<String>,
        items: Vec<QuestionItem>,
    ) -> Result<Self, QuestionSetError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(QuestionSetError::EmptyName);
        }
        if items.is_empty() {
            return Err(QuestionSetError::NoItems);
        }
        if let Some(index) = items.iter().position(|i| i.expression.trim().is_empty()) {
            return Err(QuestionSetError::EmptyExpression { index });
        }

        Ok(Self {
            id,
            name: name.trim().to_owned(),
            items,
        })
    }

    #[must_use]
    pub fn id(&self) -> QuestionSetId {
        self.id
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn items(&self) -> &[QuestionItem] {
        &self.items
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
