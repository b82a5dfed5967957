use comfy_table::{presets::NOTHING, Attribute, Cell, ContentArrangement, Table};

use crate::profile::Subscription;

const NAME_WIDTH: usize = 40;

/// Borderless, unwrapped table of subscriptions; the default is starred.
pub fn subscription_table(subscriptions: &[Subscription], default_id: Option<&str>) -> Table {
    let mut table = Table::new();
    table.load_preset(NOTHING);
    table.set_content_arrangement(ContentArrangement::Disabled);
    table.set_header(
        ["Name", "Subscription ID", "Tenant", "State", "Default"].map(|title| {
            Cell::new(title)
                .add_attribute(Attribute::Bold)
                .add_attribute(Attribute::Dim)
        }),
    );
    for column in table.column_iter_mut() {
        column.set_padding((0, 4));
    }

    for subscription in subscriptions {
        let tenant = subscription
            .tenant_default_domain
            .as_deref()
            .unwrap_or(&subscription.tenant_id);
        let is_default = default_id.is_some_and(|id| subscription.matches_id(id));
        table.add_row(vec![
            truncate(&subscription.name, NAME_WIDTH),
            subscription.id.clone(),
            tenant.to_string(),
            subscription.state.clone(),
            if is_default { "*" } else { "" }.to_string(),
        ]);
    }
    table
}

fn truncate(text: &str, max_len: usize) -> String {
    if text.chars().count() <= max_len {
        text.to_string()
    } else {
        let kept: String = text.chars().take(max_len.saturating_sub(1)).collect();
        format!("{kept}…")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::test_support::subscription;

    #[test]
    fn truncate_counts_characters() {
        assert_eq!(truncate("Prod", 10), "Prod");
        assert_eq!(truncate("Überwachung", 5), "Über…");
    }

    #[test]
    fn default_row_is_starred() {
        let mut prod = subscription("s1", "Prod", "t1");
        prod.tenant_default_domain = Some("contoso.onmicrosoft.com".into());
        let dev = subscription("s2", "Dev", "t2");

        let rendered = subscription_table(&[prod, dev], Some("S1")).to_string();
        let rows: Vec<&str> = rendered.lines().collect();
        assert_eq!(rows.len(), 3);
        assert!(rows[1].contains("contoso.onmicrosoft.com"));
        assert!(rows[1].trim_end().ends_with('*'));
        assert!(!rows[2].contains('*'));
        assert!(rows[2].contains("t2"));
    }
}
