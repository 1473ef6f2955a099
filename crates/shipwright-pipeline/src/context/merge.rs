use shipwright_core::context::AgentContext;

/// Merge per-call context over stored session context.
///
/// Named fields and passthrough keys are replaced wholesale when the
/// incoming context sets them. The `automation` hints merge key by key so
/// flags set on an earlier turn survive until explicitly overridden; an
/// incoming `null` clears a key.
pub fn merge_context(stored: &AgentContext, incoming: Option<&AgentContext>) -> AgentContext {
    let Some(incoming) = incoming else {
        return stored.clone();
    };

    let mut automation = stored.automation.clone();
    for (key, value) in &incoming.automation {
        if value.is_null() {
            automation.remove(key);
        } else {
            automation.insert(key.clone(), value.clone());
        }
    }

    let mut extra = stored.extra.clone();
    for (key, value) in &incoming.extra {
        extra.insert(key.clone(), value.clone());
    }

    AgentContext {
        repository: pick(&incoming.repository, &stored.repository),
        branch: pick(&incoming.branch, &stored.branch),
        base_branch: pick(&incoming.base_branch, &stored.base_branch),
        user_id: pick(&incoming.user_id, &stored.user_id),
        installation_id: pick(&incoming.installation_id, &stored.installation_id),
        automation,
        extra,
    }
}

fn pick<T: Clone>(incoming: &Option<T>, stored: &Option<T>) -> Option<T> {
    incoming.clone().or_else(|| stored.clone())
}
