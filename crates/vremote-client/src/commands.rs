//! Subcommand execution: one CLI command against an open connection.

use serde::Serialize;
use serde_json::json;
use uuid::Uuid;

use vremote_core::error::{Error, Result};
use vremote_core::protocol::{Domain, DomainInfo, NodeInfo};

use crate::cli::Command;
use crate::connection::Connection;

/// Human-readable name of a domain run state.
pub fn state_name(state: u32) -> &'static str {
    match state {
        1 => "running",
        2 => "idle",
        3 => "paused",
        4 => "in shutdown",
        5 => "shut off",
        6 => "crashed",
        _ => "no state",
    }
}

/// Look a domain up by id, then UUID, then name, whichever `ident` parses as.
pub async fn find_domain(conn: &mut Connection, ident: &str) -> Result<Domain> {
    if let Ok(id) = ident.parse::<i32>() {
        if id >= 0 {
            return conn.domain_lookup_by_id(id).await;
        }
    }
    if let Ok(uuid) = Uuid::parse_str(ident) {
        return conn.domain_lookup_by_uuid(&uuid).await;
    }
    conn.domain_lookup_by_name(ident).await
}

#[derive(Debug, Serialize)]
struct DomainRow {
    id: Option<i32>,
    name: String,
    state: &'static str,
}

/// Run `command` and render its result, as text or as pretty JSON.
pub async fn execute(conn: &mut Connection, command: &Command, as_json: bool) -> Result<String> {
    let value = match command {
        Command::Type => {
            let ty = conn.get_type().await?;
            if !as_json {
                return Ok(ty);
            }
            json!({ "type": ty })
        }
        Command::Version => {
            let version = conn.get_version().await?;
            if !as_json {
                return Ok(format_version(version));
            }
            json!({ "version": version, "display": format_version(version) })
        }
        Command::Nodeinfo => {
            let info = conn.node_get_info().await?;
            if !as_json {
                return Ok(format_node_info(&info));
            }
            to_value(&info)?
        }
        Command::Capabilities => {
            let xml = conn.get_capabilities().await?;
            if !as_json {
                return Ok(xml);
            }
            json!({ "capabilities": xml })
        }
        Command::MaxVcpus { ty } => {
            let max = conn.get_max_vcpus(ty.as_deref()).await?;
            if !as_json {
                return Ok(max.to_string());
            }
            json!({ "max_vcpus": max })
        }
        Command::List { all } => {
            let rows = list_rows(conn, *all).await?;
            if !as_json {
                return Ok(format_rows(&rows));
            }
            to_value(&rows)?
        }
        Command::Dominfo { domain } => {
            let dom = find_domain(conn, domain).await?;
            let info = conn.domain_get_info(&dom).await?;
            let os_type = conn.domain_get_os_type(&dom).await?;
            if !as_json {
                return Ok(format_dom_info(&dom, &os_type, &info));
            }
            json!({
                "domain": to_value(&dom)?,
                "os_type": os_type,
                "state": state_name(info.state),
                "info": to_value(&info)?,
            })
        }
        Command::Dumpxml { domain } => {
            let dom = find_domain(conn, domain).await?;
            let xml = conn.domain_dump_xml(&dom, 0).await?;
            if !as_json {
                return Ok(xml);
            }
            json!({ "name": dom.name, "xml": xml })
        }
        Command::Suspend { domain } => {
            let dom = find_domain(conn, domain).await?;
            conn.domain_suspend(&dom).await?;
            return lifecycle(&dom, "suspended", as_json);
        }
        Command::Resume { domain } => {
            let dom = find_domain(conn, domain).await?;
            conn.domain_resume(&dom).await?;
            return lifecycle(&dom, "resumed", as_json);
        }
        Command::Shutdown { domain } => {
            let dom = find_domain(conn, domain).await?;
            conn.domain_shutdown(&dom).await?;
            return lifecycle(&dom, "is being shutdown", as_json);
        }
        Command::Reboot { domain } => {
            let dom = find_domain(conn, domain).await?;
            conn.domain_reboot(&dom, 0).await?;
            return lifecycle(&dom, "is being rebooted", as_json);
        }
        Command::Destroy { domain } => {
            let dom = find_domain(conn, domain).await?;
            conn.domain_destroy(&dom).await?;
            return lifecycle(&dom, "destroyed", as_json);
        }
        Command::NetList => {
            let count = conn.num_of_networks().await?;
            let names = if count > 0 {
                conn.list_networks(count as usize).await?
            } else {
                Vec::new()
            };
            if !as_json {
                return Ok(names.join("\n"));
            }
            json!(names)
        }
        Command::NetDumpxml { network } => {
            let net = conn.network_lookup_by_name(network).await?;
            let xml = conn.network_dump_xml(&net, 0).await?;
            if !as_json {
                return Ok(xml);
            }
            json!({ "name": net.name, "xml": xml })
        }
        Command::NetBridge { network } => {
            let net = conn.network_lookup_by_name(network).await?;
            let bridge = conn.network_get_bridge_name(&net).await?;
            if !as_json {
                return Ok(bridge);
            }
            json!({ "name": net.name, "bridge": bridge })
        }
    };

    serde_json::to_string_pretty(&value).map_err(|e| Error::codec(e.to_string()))
}

async fn list_rows(conn: &mut Connection, all: bool) -> Result<Vec<DomainRow>> {
    let mut rows = Vec::new();

    let active = conn.num_of_domains().await?;
    if active > 0 {
        for id in conn.list_domains(active as usize).await? {
            let dom = conn.domain_lookup_by_id(id).await?;
            let info = conn.domain_get_info(&dom).await?;
            rows.push(DomainRow {
                id: Some(id),
                name: dom.name,
                state: state_name(info.state),
            });
        }
    }

    if all {
        let defined = conn.num_of_defined_domains().await?;
        if defined > 0 {
            for name in conn.list_defined_domains(defined as usize).await? {
                rows.push(DomainRow {
                    id: None,
                    name,
                    state: state_name(5),
                });
            }
        }
    }
    Ok(rows)
}

fn lifecycle(dom: &Domain, verb: &str, as_json: bool) -> Result<String> {
    if !as_json {
        return Ok(format!("Domain {} {}", dom.name, verb));
    }
    serde_json::to_string_pretty(&json!({ "name": dom.name, "result": verb }))
        .map_err(|e| Error::codec(e.to_string()))
}

fn to_value<T: Serialize>(value: &T) -> Result<serde_json::Value> {
    serde_json::to_value(value).map_err(|e| Error::codec(e.to_string()))
}

fn format_version(version: i64) -> String {
    format!(
        "{}.{}.{}",
        version / 1_000_000,
        (version / 1_000) % 1_000,
        version % 1_000
    )
}

fn format_node_info(info: &NodeInfo) -> String {
    format!(
        "CPU model:           {}\n\
         CPU(s):              {}\n\
         CPU frequency:       {} MHz\n\
         CPU socket(s):       {}\n\
         Core(s) per socket:  {}\n\
         Thread(s) per core:  {}\n\
         NUMA cell(s):        {}\n\
         Memory size:         {} KiB",
        info.model,
        info.cpus,
        info.mhz,
        info.sockets,
        info.cores,
        info.threads,
        info.nodes,
        info.memory
    )
}

fn format_dom_info(dom: &Domain, os_type: &str, info: &DomainInfo) -> String {
    let id = if dom.id < 0 {
        "-".to_string()
    } else {
        dom.id.to_string()
    };
    format!(
        "Id:             {}\n\
         Name:           {}\n\
         UUID:           {}\n\
         OS Type:        {}\n\
         State:          {}\n\
         CPU(s):         {}\n\
         CPU time:       {:.1}s\n\
         Max memory:     {} KiB\n\
         Used memory:    {} KiB",
        id,
        dom.name,
        dom.uuid,
        os_type,
        state_name(info.state),
        info.nr_virt_cpu,
        info.cpu_time as f64 / 1e9,
        info.max_mem,
        info.memory
    )
}

fn format_rows(rows: &[DomainRow]) -> String {
    let mut out = format!(" {:<5} {:<30} {}\n", "Id", "Name", "State");
    out.push_str(&"-".repeat(50));
    for row in rows {
        let id = row.id.map_or_else(|| "-".to_string(), |id| id.to_string());
        out.push_str(&format!("\n {:<5} {:<30} {}", id, row.name, row.state));
    }
    out
}
