use comfy_table::{Attribute, Cell, Color, Table, modifiers, presets};
use wnsm::{Address, Contract};

pub fn build_metering_points_table(contracts: &[Contract]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_FULL_CONDENSED)
        .apply_modifier(modifiers::UTF8_ROUND_CORNERS)
        .enforce_styling();
    table.set_header(vec!["Customer", "Metering point", "Name", "Type", "Granularity", "Address"]);
    for contract in contracts {
        for metering_point in &contract.metering_points {
            let kind = metering_point
                .installation
                .as_ref()
                .and_then(|installation| installation.kind.as_deref())
                .unwrap_or_default();
            table.add_row(vec![
                Cell::new(&contract.customer_id).add_attribute(Attribute::Dim),
                Cell::new(&metering_point.id).fg(if metering_point.is_active() {
                    Color::Green
                } else {
                    Color::Red
                }),
                Cell::new(metering_point.name()),
                Cell::new(kind),
                Cell::new(metering_point.granularity().unwrap_or_default()),
                Cell::new(metering_point.address.as_ref().map(format_address).unwrap_or_default())
                    .add_attribute(Attribute::Dim),
            ]);
        }
    }
    table
}

fn format_address(address: &Address) -> String {
    if let Some(full_address) = &address.full_address {
        return full_address.clone();
    }
    [&address.street, &address.house_number, &address.postal_code, &address.city]
        .into_iter()
        .flatten()
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join(" ")
}
