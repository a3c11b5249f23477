use std::sync::Arc;

use handlebars::Handlebars;
use serde_json::json;
use tiny_http::{Header, Method, Request, Response, ResponseBox, Server};

use crate::dns::context::ServerContext;
use crate::dns::logging::{log_http_request, CorrelationContext, HttpRequestLog};
use crate::web::{
    hosts::{self, AddHostRequest, DeleteHostRequest, LookupKind, LookupRequest},
    util::{parse_formdata, split_url, FormDataDecodable},
    Result, WebError,
};

const RELOAD_WARNING: &str =
    "The record was saved, but the name server did not reload. Check the server log.";

trait MediaType {
    fn json_input(&self) -> bool;
    fn json_output(&self) -> bool;
}

fn header_contains(request: &Request, field: &'static str, needle: &str) -> bool {
    request
        .headers()
        .iter()
        .find(|x| x.field.equiv(field))
        .map(|x| x.value.as_str().contains(needle))
        .unwrap_or_default()
}

impl MediaType for Request {
    fn json_input(&self) -> bool {
        header_contains(self, "Content-Type", "application/json")
    }

    fn json_output(&self) -> bool {
        header_contains(self, "Accept", "application/json")
    }
}

fn header(field: &str, value: &str) -> Result<Header> {
    Header::from_bytes(field.as_bytes(), value.as_bytes())
        .map_err(|_| WebError::InvalidRequest(format!("Invalid header {}: {}", field, value)))
}

pub struct WebServer<'a> {
    pub context: Arc<ServerContext>,
    pub handlebars: Handlebars<'a>,
}

impl<'a> WebServer<'a> {
    pub fn new(context: Arc<ServerContext>) -> WebServer<'a> {
        let mut server = WebServer {
            context,
            handlebars: Handlebars::new(),
        };

        let mut register_template = |name, data: &str| {
            if let Err(e) = server.handlebars.register_template_string(name, data) {
                log::error!("Failed to register template {}: {}", name, e);
            }
        };

        register_template("index", include_str!("templates/index.html"));
        register_template("lookup", include_str!("templates/lookup.html"));
        register_template("error", include_str!("templates/error.html"));

        server
    }

    /// Route an HTTP request to the appropriate handler
    fn route_request(&self, request: &mut Request) -> Result<ResponseBox> {
        let url = request.url().to_string();
        let (path, query) = split_url(&url)?;
        let method = request.method().clone();
        let url_parts: Vec<&str> = path.split('/').filter(|x| !x.is_empty()).collect();

        match (method, url_parts.as_slice()) {
            (Method::Get, []) => self.index(request, &query),
            (Method::Post, ["add"]) => self.host_add(request),
            (Method::Post, ["delete"]) => self.host_delete(request),
            (Method::Post, ["test", "forward"]) => self.lookup(request, LookupKind::Forward),
            (Method::Post, ["test", "reverse"]) => self.lookup(request, LookupKind::Reverse),
            (_, _) => self.not_found(request),
        }
    }

    /// Handle a single HTTP request
    fn handle_request(&self, mut request: Request) {
        let ctx = CorrelationContext::new("web", "request");
        let method = request.method().to_string();
        let path = request.url().to_string();

        let response = match self.route_request(&mut request) {
            Ok(response) => response,
            Err(err) => self.error_response(&request, &err),
        };

        log_http_request(
            &ctx,
            &HttpRequestLog {
                method,
                path,
                status_code: response.status_code().0,
            },
        );

        if let Err(err) = request.respond(response) {
            log::info!("Failed to write response to client: {:?}", err);
        }
    }

    /// Failures are never redirects: the client gets the message and a
    /// non-2xx status.
    fn error_response(&self, request: &Request, err: &WebError) -> ResponseBox {
        let status = err.status_code();
        if status >= 500 {
            log::error!("Request failed: {}", err);
        } else {
            log::info!("Request rejected: {}", err);
        }

        let data = json!({
            "ok": false,
            "status": status,
            "message": err.to_string(),
        });

        let (body, content_type) = if request.json_output() {
            (data.to_string(), "application/json")
        } else {
            match self.handlebars.render("error", &data) {
                Ok(html) => (html, "text/html; charset=utf-8"),
                Err(_) => (err.to_string(), "text/plain; charset=utf-8"),
            }
        };

        let response = Response::from_string(body).with_status_code(status);
        match header("Content-Type", content_type) {
            Ok(h) => response.with_header(h).boxed(),
            Err(_) => response.boxed(),
        }
    }

    pub fn run_webserver(self) -> std::result::Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let address = self.context.settings.listen_address();
        let webserver = Server::http(address.as_str())?;

        log::info!("HTTP web server started and listening on {}", address);

        self.serve(&webserver);
        Ok(())
    }

    /// Answer requests from `webserver` one at a time until it shuts down.
    pub fn serve(&self, webserver: &Server) {
        for request in webserver.incoming_requests() {
            self.handle_request(request);
        }
    }

    fn response_from_media_type<R>(&self, request: &Request, template: &str, data: R) -> Result<ResponseBox>
    where
        R: serde::Serialize,
    {
        Ok(if request.json_output() {
            Response::from_string(serde_json::to_string(&data)?)
                .with_header(header("Content-Type", "application/json")?)
                .boxed()
        } else {
            Response::from_string(self.handlebars.render(template, &data)?)
                .with_header(header("Content-Type", "text/html; charset=utf-8")?)
                .boxed()
        })
    }

    fn index(&self, request: &Request, query: &[(String, String)]) -> Result<ResponseBox> {
        let warning = query
            .iter()
            .find(|(k, v)| k == "warning" && v == "reload")
            .map(|_| RELOAD_WARNING);

        let index_result = hosts::host_list(&self.context, warning)?;
        self.response_from_media_type(request, "index", index_result)
    }

    /// Redirect back to the listing, or the outcome as JSON
    fn mutation_response(&self, request: &Request, outcome: &crate::dns::authority::MutationOutcome) -> Result<ResponseBox> {
        if request.json_output() {
            return self.response_from_media_type(request, "index", hosts::mutation_summary(outcome));
        }

        let location = match hosts::reload_warning(&outcome.reload) {
            Some(warning) => format!("/?warning={}", warning),
            None => "/".to_string(),
        };

        Ok(Response::empty(302)
            .with_header(header("Location", &location)?)
            .boxed())
    }

    fn host_add(&self, request: &mut Request) -> Result<ResponseBox> {
        let add_request = if request.json_input() {
            serde_json::from_reader(request.as_reader())?
        } else {
            parse_formdata(&mut request.as_reader()).and_then(AddHostRequest::from_formdata)?
        };

        let outcome = hosts::host_add(&self.context, add_request)?;
        self.mutation_response(request, &outcome)
    }

    fn host_delete(&self, request: &mut Request) -> Result<ResponseBox> {
        let delete_request = if request.json_input() {
            serde_json::from_reader(request.as_reader())?
        } else {
            parse_formdata(&mut request.as_reader()).and_then(DeleteHostRequest::from_formdata)?
        };

        let outcome = hosts::host_delete(&self.context, delete_request)?;
        self.mutation_response(request, &outcome)
    }

    fn lookup(&self, request: &mut Request, kind: LookupKind) -> Result<ResponseBox> {
        let lookup_request = if request.json_input() {
            serde_json::from_reader(request.as_reader())?
        } else {
            parse_formdata(&mut request.as_reader())
                .and_then(|fields| LookupRequest::from_formdata(kind, fields))?
        };

        let lookup_result = hosts::lookup(&self.context, kind, lookup_request)?;
        self.response_from_media_type(request, "lookup", lookup_result)
    }

    fn not_found(&self, _request: &Request) -> Result<ResponseBox> {
        Ok(Response::from_string("Not found")
            .with_status_code(404)
            .boxed())
    }
}
