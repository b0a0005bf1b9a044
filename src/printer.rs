//! Fixed-width text rendering of route tables and links.

use crate::NodeId;
use crate::simulation::{LinkView, RouteDump};
use std::fmt::{self, Write};

impl fmt::Display for RouteDump {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{:<16} {:<16} {:<16} {:<8}", "Node", "Destination", "Next Hop", "Cost")?;
        writeln!(f, "{}", "-".repeat(59))?;

        if self.rows.is_empty() {
            return writeln!(f, "No routes found");
        }

        let mut current: Option<&NodeId> = None;
        for row in &self.rows {
            if current.is_some() && current != Some(&row.node) {
                writeln!(f)?;
            }
            current = Some(&row.node);
            writeln!(
                f,
                "{:<16} {:<16} {:<16} {:<8}",
                row.node.to_string(),
                row.destination.to_string(),
                row.next_hop.to_string(),
                row.cost
            )?;
        }
        Ok(())
    }
}

pub fn format_links(links: &[LinkView]) -> String {
    let mut output = String::new();
    // writing into a String cannot fail
    let _ = writeln!(output, "{:<16} {:<16} {:<8} {:<8}", "Endpoint A", "Endpoint B", "A->B", "B->A");
    let _ = writeln!(output, "{}", "-".repeat(51));
    for link in links {
        let _ = writeln!(
            output,
            "{:<16} {:<16} {:<8} {:<8}",
            link.a.to_string(),
            link.b.to_string(),
            cost_cell(link.cost_ab),
            cost_cell(link.cost_ba)
        );
    }
    output
}

fn cost_cell(cost: Option<u64>) -> String {
    cost.map(|c| c.to_string()).unwrap_or_else(|| "-".to_string())
}
