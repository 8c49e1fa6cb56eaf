use crate::model::TodoFilter;

/// Storage-level predicate over live todos. The default value matches
/// everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Predicate {
    pub completed: Option<bool>,
    /// Substring that must appear in the title or the description.
    pub search: Option<String>,
}

pub fn compile(filter: Option<&TodoFilter>) -> Predicate {
    let Some(filter) = filter else {
        return Predicate::default();
    };
    let search = filter
        .search
        .as_deref()
        .filter(|s| !s.trim().is_empty())
        .map(str::to_string);
    Predicate {
        completed: filter.completed,
        search,
    }
}
