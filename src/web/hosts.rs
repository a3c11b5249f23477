use std::collections::HashMap;

use serde_derive::{Deserialize, Serialize};
use serde_json::json;

use crate::dns::authority::{MutationOutcome, ReloadStatus};
use crate::dns::context::ServerContext;
use crate::web::util::FormDataDecodable;
use crate::web::{Result, WebError};

#[derive(Debug, Serialize, Deserialize)]
pub struct AddHostRequest {
    pub name: String,
    pub ip: String,
}

impl FormDataDecodable<AddHostRequest> for AddHostRequest {
    fn from_formdata(fields: Vec<(String, String)>) -> Result<AddHostRequest> {
        let mut d: HashMap<_, _> = fields.into_iter().collect();

        let name = d.remove("name").ok_or(WebError::MissingField("name"))?;
        let ip = d.remove("ip").ok_or(WebError::MissingField("ip"))?;

        Ok(AddHostRequest { name, ip })
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DeleteHostRequest {
    pub name: String,
}

impl FormDataDecodable<DeleteHostRequest> for DeleteHostRequest {
    fn from_formdata(fields: Vec<(String, String)>) -> Result<DeleteHostRequest> {
        let mut d: HashMap<_, _> = fields.into_iter().collect();

        let name = d.remove("name").ok_or(WebError::MissingField("name"))?;

        Ok(DeleteHostRequest { name })
    }
}

/// Which way a diagnostic lookup goes
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LookupKind {
    Forward,
    Reverse,
}

impl LookupKind {
    /// Form field carrying the lookup target
    pub fn field(&self) -> &'static str {
        match self {
            LookupKind::Forward => "hostname",
            LookupKind::Reverse => "ip",
        }
    }

    fn title(&self) -> &'static str {
        match self {
            LookupKind::Forward => "Forward Lookup",
            LookupKind::Reverse => "Reverse Lookup",
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LookupRequest {
    pub target: String,
}

impl LookupRequest {
    pub fn from_formdata(kind: LookupKind, fields: Vec<(String, String)>) -> Result<LookupRequest> {
        let mut d: HashMap<_, _> = fields.into_iter().collect();

        let target = d
            .remove(kind.field())
            .ok_or(WebError::MissingField(kind.field()))?;

        Ok(LookupRequest { target })
    }
}

/// Listing shown on the main page
pub fn host_list(context: &ServerContext, warning: Option<&str>) -> Result<serde_json::Value> {
    let records = context.authority.records()?;
    let domain = &context.settings.domain;

    let rows: Vec<_> = records
        .iter()
        .map(|r| {
            json!({
                "name": r.name,
                "ip": r.address.to_string(),
                "fqdn": format!("{}.{}", r.name, domain),
            })
        })
        .collect();

    Ok(json!({
        "ok": true,
        "domain": domain,
        "nameserver": context.settings.nameserver_ip.to_string(),
        "record_count": rows.len(),
        "records": rows,
        "warning": warning,
    }))
}

pub fn host_add(context: &ServerContext, request: AddHostRequest) -> Result<MutationOutcome> {
    Ok(context.authority.upsert(&request.name, &request.ip)?)
}

pub fn host_delete(context: &ServerContext, request: DeleteHostRequest) -> Result<MutationOutcome> {
    Ok(context.authority.delete_record(&request.name)?)
}

/// JSON summary of a committed mutation
pub fn mutation_summary(outcome: &MutationOutcome) -> serde_json::Value {
    json!({
        "ok": true,
        "record_count": outcome.records.len(),
        "records": outcome.records,
        "serial": outcome.documents.serial,
        "reload": outcome.reload,
    })
}

/// Message shown on the listing when the name server did not pick up a change
pub fn reload_warning(reload: &ReloadStatus) -> Option<&'static str> {
    match reload {
        ReloadStatus::Reloaded => None,
        ReloadStatus::Failed(_) => Some("reload"),
    }
}

pub fn lookup(context: &ServerContext, kind: LookupKind, request: LookupRequest) -> Result<serde_json::Value> {
    let target = request.target.trim().to_string();
    let output = context.lookup(&target)?;

    Ok(json!({
        "ok": true,
        "title": format!("{}: {}", kind.title(), target),
        "target": target,
        "output": output,
    }))
}
