use crate::model::UpdateTodo;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldChange {
    Title(String),
    Description(String),
    Completed(bool),
}

impl FieldChange {
    pub fn column(&self) -> &'static str {
        match self {
            Self::Title(_) => "title",
            Self::Description(_) => "description",
            Self::Completed(_) => "completed",
        }
    }
}

/// The set of fields an update writes, in a fixed title/description/completed
/// order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Delta(Vec<FieldChange>);

impl Delta {
    pub fn new(changes: Vec<FieldChange>) -> Self {
        Self(changes)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn changes(&self) -> &[FieldChange] {
        &self.0
    }
}

/// Every field present in `input` is carried over, even when it equals the
/// stored value.
pub fn delta(input: &UpdateTodo) -> Delta {
    let mut changes = Vec::with_capacity(3);
    if let Some(title) = &input.title {
        changes.push(FieldChange::Title(title.clone()));
    }
    if let Some(description) = &input.description {
        changes.push(FieldChange::Description(description.clone()));
    }
    if let Some(completed) = input.completed {
        changes.push(FieldChange::Completed(completed));
    }
    Delta(changes)
}
