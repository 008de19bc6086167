// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Mock resources and subscribers.

use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

pub const LDP_INBOX: &str = "http://www.w3.org/ns/ldp#inbox";

/// Publish a resource at `resource` advertising `hub_base` as both its inbox
/// and its hub. Returns the resource URL.
pub async fn publish(server: &MockServer, resource: &str, hub_base: &str) -> String {
    let url = format!("{}{resource}", server.uri());
    let links = format!(
        r#"<{hub_base}/inbox?target={url}>; rel="{LDP_INBOX}", <{hub_base}/hub>; rel="hub", <{url}>; rel="self""#
    );
    publish_with_links(server, resource, &links).await;
    url
}

/// Publish a resource at `resource` with an arbitrary `Link` header value.
pub async fn publish_with_links(server: &MockServer, resource: &str, links: &str) -> String {
    Mock::given(method("GET"))
        .and(path(resource))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("Link", links)
                .set_body_string("<html></html>"),
        )
        .mount(server)
        .await;
    format!("{}{resource}", server.uri())
}

/// Echoes `hub.challenge` back, like a cooperating subscriber.
pub struct EchoChallenge;

impl Respond for EchoChallenge {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let challenge = request
            .url
            .query_pairs()
            .find(|(k, _)| k == "hub.challenge")
            .map(|(_, v)| v.into_owned())
            .unwrap_or_default();
        ResponseTemplate::new(200).set_body_string(challenge)
    }
}

/// A WebSub subscriber at `/cb`. When `cooperative` is false it answers
/// verification with a fixed body instead of the challenge.
pub async fn subscriber(cooperative: bool) -> (MockServer, String) {
    let server = MockServer::start().await;

    let verification = Mock::given(method("GET")).and(path("/cb"));
    if cooperative {
        verification.respond_with(EchoChallenge).mount(&server).await;
    } else {
        verification
            .respond_with(ResponseTemplate::new(200).set_body_string("nope"))
            .mount(&server)
            .await;
    }

    Mock::given(method("POST"))
        .and(path("/cb"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let callback = format!("{}/cb", server.uri());
    (server, callback)
}

/// Requests `server` received with the given method.
pub async fn received(server: &MockServer, verb: &str) -> Vec<Request> {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .into_iter()
        .filter(|r| r.method.as_str() == verb)
        .collect()
}
