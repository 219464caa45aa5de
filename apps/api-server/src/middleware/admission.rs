//! Admission middleware - every request is checked before routing.

use actix_web::{
    Error, HttpResponse,
    body::EitherBody,
    dev::{Service, ServiceRequest, ServiceResponse, Transform, forward_ready},
    http::header::{CONTENT_LENGTH, HeaderName, HeaderValue, RETRY_AFTER},
};
use chrono::{DateTime, Utc};
use gatekeeper_core::AdmissionError;
use gatekeeper_core::ports::Clock;
use gatekeeper_infra::AdmissionController;
use gatekeeper_shared::ErrorResponse;
use std::future::{Future, Ready, ready};
use std::net::{IpAddr, SocketAddr};
use std::pin::Pin;
use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;

pub const RATE_LIMIT_REMAINING: &str = "x-ratelimit-remaining";
const X_FORWARDED_FOR: &str = "x-forwarded-for";

/// Admission middleware factory.
pub struct AdmissionMiddleware {
    controller: Arc<AdmissionController>,
    clock: Arc<dyn Clock>,
    trusted_proxies: Arc<[IpAddr]>,
}

impl AdmissionMiddleware {
    pub fn new(controller: Arc<AdmissionController>, clock: Arc<dyn Clock>) -> Self {
        Self {
            controller,
            clock,
            trusted_proxies: Arc::from(Vec::new()),
        }
    }

    /// Peers whose `X-Forwarded-For` header is believed. Requests from any
    /// other peer are keyed on the socket address.
    pub fn trust_proxies(mut self, proxies: impl Into<Arc<[IpAddr]>>) -> Self {
        self.trusted_proxies = proxies.into();
        self
    }
}

impl<S, B> Transform<S, ServiceRequest> for AdmissionMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Transform = AdmissionMiddlewareService<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(AdmissionMiddlewareService {
            service: Rc::new(service),
            controller: self.controller.clone(),
            clock: self.clock.clone(),
            trusted_proxies: self.trusted_proxies.clone(),
        }))
    }
}

pub struct AdmissionMiddlewareService<S> {
    service: Rc<S>,
    controller: Arc<AdmissionController>,
    clock: Arc<dyn Clock>,
    trusted_proxies: Arc<[IpAddr]>,
}

impl<S, B> Service<ServiceRequest> for AdmissionMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>>>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let service = self.service.clone();
        let controller = self.controller.clone();
        let clock = self.clock.clone();
        let resolved = client_ip(&req, &self.trusted_proxies);

        Box::pin(async move {
            let Some(ip) = resolved else {
                tracing::warn!(path = %req.path(), "Client address unresolvable, admitting request");
                let res = service.call(req).await?;
                return Ok(res.map_into_left_body());
            };

            match controller.admit(ip, content_length(&req)).await {
                Ok(admission) => {
                    let mut res = service.call(req).await?;
                    res.headers_mut().insert(
                        HeaderName::from_static(RATE_LIMIT_REMAINING),
                        HeaderValue::from(admission.remaining),
                    );
                    Ok(res.map_into_left_body())
                }
                Err(rejection) => {
                    tracing::debug!(ip = %ip, reason = %rejection, "Request rejected");
                    let response = rejection_response(&rejection, clock.now());
                    Ok(req.into_response(response).map_into_right_body())
                }
            }
        })
    }
}

/// The socket peer, unless it is a trusted proxy. Behind trusted proxies
/// the rightmost `X-Forwarded-For` hop that is not itself trusted wins.
fn client_ip(req: &ServiceRequest, trusted: &[IpAddr]) -> Option<IpAddr> {
    let peer = req.peer_addr()?.ip();
    if !trusted.contains(&peer) {
        return Some(peer);
    }

    let hops: Vec<&str> = req
        .headers()
        .get_all(X_FORWARDED_FOR)
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .collect();
    Some(forwarded_client(peer, &hops, trusted))
}

fn forwarded_client(peer: IpAddr, hops: &[&str], trusted: &[IpAddr]) -> IpAddr {
    let mut client = peer;
    for hop in hops.iter().rev() {
        // Nothing left of a malformed hop can be believed.
        let Some(ip) = parse_client_ip(hop) else {
            break;
        };
        client = ip;
        if !trusted.contains(&ip) {
            break;
        }
    }
    client
}

fn parse_client_ip(raw: &str) -> Option<IpAddr> {
    let raw = raw.trim();
    raw.parse::<IpAddr>()
        .ok()
        .or_else(|| raw.parse::<SocketAddr>().ok().map(|addr| addr.ip()))
}

fn content_length(req: &ServiceRequest) -> Option<u64> {
    req.headers()
        .get(CONTENT_LENGTH)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse().ok())
}

fn rejection_response(rejection: &AdmissionError, now: DateTime<Utc>) -> HttpResponse {
    if let AdmissionError::PayloadTooLarge { .. } = rejection {
        return HttpResponse::PayloadTooLarge()
            .json(ErrorResponse::payload_too_large(rejection.to_string()));
    }

    let mut builder = HttpResponse::TooManyRequests();
    builder.insert_header((RATE_LIMIT_REMAINING, "0"));
    if let Some(retry_after) = rejection.retry_after(now) {
        builder.insert_header((RETRY_AFTER, whole_seconds(retry_after).to_string()));
    }
    builder.json(ErrorResponse::too_many_requests(rejection.to_string()))
}

/// Rounded up, never below one second.
fn whole_seconds(duration: Duration) -> u64 {
    let secs = duration.as_secs() + u64::from(duration.subsec_nanos() > 0);
    secs.max(1)
}
