use crate::model::TodoResponse;

fn marker(todo: &TodoResponse) -> &'static str {
    if todo.completed {
        "[x]"
    } else {
        "[ ]"
    }
}

pub fn format_todo_detail(todo: &TodoResponse) -> String {
    let mut out = String::new();
    out.push_str(&format!("ID:          {}\n", todo.id));
    out.push_str(&format!("Title:       {}\n", todo.title));
    out.push_str(&format!(
        "Status:      {}\n",
        if todo.completed { "done" } else { "open" }
    ));
    if !todo.description.is_empty() {
        out.push_str(&format!("Description: {}\n", todo.description));
    }
    out.push_str(&format!("Created:     {}\n", todo.created_at.to_rfc3339()));
    out.push_str(&format!("Updated:     {}\n", todo.updated_at.to_rfc3339()));
    out
}

pub fn format_todo_list(todos: &[TodoResponse]) -> String {
    let width = todos.iter().map(|t| t.id.len()).max().unwrap_or(0);
    let mut out = String::new();
    for todo in todos {
        let desc = if todo.description.is_empty() {
            String::new()
        } else {
            format!("  {}", todo.description)
        };
        out.push_str(&format!(
            "{} {:>width$} {}{}\n",
            marker(todo),
            todo.id,
            todo.title,
            desc
        ));
    }
    out
}
