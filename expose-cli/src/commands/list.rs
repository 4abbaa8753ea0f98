use anyhow::Result;
use comfy_table::{Cell, Color, ContentArrangement, Table, presets::UTF8_FULL_CONDENSED};
use expose_core::{ServiceRecord, ServiceStatus};

const EMPTY_HINT: &str =
    "No port exposed, use 'expose start <port>' to expose a port or 'expose --help' to see the help";

pub fn list() -> Result<()> {
    let controller = super::controller()?;
    let records = controller.list();

    if records.is_empty() {
        println!("{EMPTY_HINT}");
        return Ok(());
    }

    println!("{}", render_table(&records));
    Ok(())
}

pub fn urls() -> Result<()> {
    let controller = super::controller()?;
    let urls = controller.public_urls();

    if urls.is_empty() {
        println!("{EMPTY_HINT}");
        return Ok(());
    }

    for (port, url) in urls {
        println!("{port:>5}  {url}");
    }
    Ok(())
}

fn render_table(records: &[ServiceRecord]) -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![
        Cell::new("Port").fg(Color::Cyan),
        Cell::new("Service").fg(Color::Cyan),
        Cell::new("URL").fg(Color::Cyan),
        Cell::new("Status").fg(Color::Cyan),
    ]);

    for record in records {
        table.add_row(vec![
            Cell::new(record.port),
            Cell::new(record.service_name.as_deref().unwrap_or("-")),
            Cell::new(record.public_url().unwrap_or_else(|| "-".to_string())),
            status_cell(record.status),
        ]);
    }

    table
}

fn status_cell(status: ServiceStatus) -> Cell {
    let color = match status {
        ServiceStatus::Started => Color::Green,
        ServiceStatus::Stopped => Color::Yellow,
        ServiceStatus::Deleted => Color::DarkGrey,
    };
    Cell::new(status).fg(color)
}

#[cfg(test)]
mod tests {
    use super::*;
    use expose_core::{IdentityHandle, LocalProtocol, Port};
    use std::path::PathBuf;

    fn record(port: u16, started: bool) -> ServiceRecord {
        let port = Port::new(port).unwrap();
        let mut record = ServiceRecord::new(
            port,
            IdentityHandle {
                name: format!("devbox-{port}"),
                id: "abc".to_string(),
                credentials_path: PathBuf::from("/creds/abc.json"),
            },
            LocalProtocol::Http,
        );
        record.begin_generation(
            format!("devbox-{port}-q1w2e3.example.com"),
            PathBuf::from(format!("/creds/devbox-{port}-q1w2e3.yml")),
            LocalProtocol::Http,
        );
        if !started {
            record.mark_stopped();
        }
        record
    }

    #[test]
    fn table_has_one_row_per_record() {
        let mut web = record(8080, true);
        web.service_name = Some("http-alt".to_string());
        let rendered = render_table(&[web, record(3000, false)]).to_string();

        for header in ["Port", "Service", "URL", "Status"] {
            assert!(rendered.contains(header), "missing header {header}");
        }
        assert!(rendered.contains("8080"));
        assert!(rendered.contains("http-alt"));
        assert!(rendered.contains("https://devbox-8080-q1w2e3.example.com"));
        assert!(rendered.contains("Started"));
        assert!(rendered.contains("Stopped"));
    }
}
