use crate::models::{format_price, Service};

/// A service as shown in the chat menu, with its 1-based menu number.
#[derive(Debug, Clone, PartialEq)]
pub struct CatalogEntry<'a> {
    pub index: usize,
    pub service: &'a Service,
}

/// Active services in source order, numbered from 1.
///
/// Nothing is cached: if the active set changes between rendering a menu and
/// the customer's numeric reply, the reply resolves against the new numbering.
pub fn resolve(services: &[Service]) -> Vec<CatalogEntry<'_>> {
    services
        .iter()
        .filter(|s| s.active)
        .enumerate()
        .map(|(i, service)| CatalogEntry {
            index: i + 1,
            service,
        })
        .collect()
}

pub fn lookup(services: &[Service], index: usize) -> Option<&Service> {
    resolve(services)
        .into_iter()
        .find(|entry| entry.index == index)
        .map(|entry| entry.service)
}

/// One `"{index}. {name}"` line per active service.
pub fn render_menu(services: &[Service]) -> String {
    resolve(services)
        .iter()
        .map(|entry| format!("{}. {}", entry.index, entry.service.name))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Like [`render_menu`] but with price and duration on each line.
pub fn render_price_list(services: &[Service]) -> String {
    resolve(services)
        .iter()
        .map(|entry| {
            format!(
                "• {} — {} ({} min)",
                entry.service.name,
                format_price(entry.service.price),
                entry.service.duration_minutes
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}
