use group_service::config::{
    DecisionCacheConfig, GroupServiceConfig, RawCredentials, RawProviderConfig,
    TokenValidatorConfig,
};
use group_service::startup::Application;
use secrecy::Secret;
use serde_json::json;
use service_core::config::Config as CoreConfig;
use wiremock::matchers::{body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const USER: &str = "urn:collab:person:example.org:admin";
pub const USER_TOKEN: &str = "user-token";
pub const CLIENT_TOKEN: &str = "client-token";
pub const NO_SCOPE_TOKEN: &str = "no-scope-token";

pub const MEMBERSHIPS_RESPONSE: &str = include_str!("../fixtures/get_memberships.xml");
pub const FIND_GROUPS_RESPONSE: &str = include_str!("../fixtures/find_groups.xml");

pub struct TestApp {
    pub address: String,
    pub port: u16,
    pub client: reqwest::Client,
    pub authz: MockServer,
    pub grouper: MockServer,
    pub partner: MockServer,
}

impl TestApp {
    pub async fn spawn() -> Self {
        let authz = MockServer::start().await;
        let grouper = MockServer::start().await;
        let partner = MockServer::start().await;

        mount_introspection(&authz).await;
        mount_grouper(&grouper).await;
        mount_partner(&partner).await;

        let config = GroupServiceConfig {
            server: CoreConfig {
                port: 0, // Random port
                log_level: "debug".to_string(),
                otlp_endpoint: String::new(),
            },
            service_name: "group-service-test".to_string(),
            required_scope: "read".to_string(),
            providers: vec![
                provider("grouper", &grouper.uri(), "surfteams.nl", true),
                provider("voot2", &format!("{}/api/", partner.uri()), "example.org", true),
            ],
            token_validators: vec![TokenValidatorConfig {
                name: "authz".to_string(),
                url: format!("{}/introspect", authz.uri()),
                client_id: "groups".to_string(),
                secret: Secret::new("secret".to_string()),
                timeout_ms: 2000,
            }],
            decision_cache: DecisionCacheConfig::default(),
        };

        let app = Application::build(config)
            .await
            .expect("Failed to build test application");

        let port = app.port();
        let address = format!("http://127.0.0.1:{}", port);

        tokio::spawn(async move {
            app.run_until_stopped().await.ok();
        });

        // Wait for HTTP server to be ready by polling health endpoint
        let client = reqwest::Client::new();
        let health_url = format!("{}/health", address);
        for _ in 0..50 {
            if client.get(&health_url).send().await.is_ok() {
                break;
            }
            tokio::time::sleep(tokio::time::Duration::from_millis(50)).await;
        }

        TestApp {
            address,
            port,
            client,
            authz,
            grouper,
            partner,
        }
    }

    pub async fn get(&self, path: &str, token: Option<&str>) -> reqwest::Response {
        let mut request = self.client.get(format!("{}{}", self.address, path));
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }
        request.send().await.expect("Failed to execute request")
    }
}

fn provider(kind: &str, url: &str, organization: &str, supports_get_members: bool) -> RawProviderConfig {
    RawProviderConfig {
        kind: kind.to_string(),
        url: url.to_string(),
        credentials: RawCredentials {
            username: format!("{}-user", kind),
            secret: Secret::new("secret".to_string()),
        },
        timeout_ms: 2000,
        schac_home_organization: organization.to_string(),
        name: kind.to_string(),
        supports_get_members,
    }
}

async fn mount_introspection(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/introspect"))
        .and(body_string_contains(format!("token={}", USER_TOKEN)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "active": true,
            "sub": USER,
            "client_id": "portal",
            "scope": "read",
            "schac_home_organization": "example.org"
        })))
        .mount(server)
        .await;

    Mock::given(method("POST"))
        .and(path("/introspect"))
        .and(body_string_contains(format!("token={}", CLIENT_TOKEN)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "active": true,
            "sub": "portal",
            "client_id": "portal",
            "scope": "read"
        })))
        .mount(server)
        .await;

    Mock::given(method("POST"))
        .and(path("/introspect"))
        .and(body_string_contains(format!("token={}", NO_SCOPE_TOKEN)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "active": true,
            "sub": USER,
            "client_id": "portal",
            "scope": "openid"
        })))
        .mount(server)
        .await;

    Mock::given(method("POST"))
        .and(path("/introspect"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "active": false })))
        .with_priority(10)
        .mount(server)
        .await;
}

async fn mount_grouper(server: &MockServer) {
    Mock::given(method("POST"))
        .and(header("SOAPAction", "getMemberships"))
        .respond_with(ResponseTemplate::new(200).set_body_string(MEMBERSHIPS_RESPONSE))
        .mount(server)
        .await;

    Mock::given(method("POST"))
        .and(header("SOAPAction", "findGroups"))
        .respond_with(ResponseTemplate::new(200).set_body_string(FIND_GROUPS_RESPONSE))
        .mount(server)
        .await;
}

async fn mount_partner(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/api/user/admin/groups"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {
                "id": "course:math",
                "displayName": "Math",
                "membership": { "basic": "member" }
            },
            {
                "id": "urn:collab:group:surfteams.nl:nl:surfnet:diensten:apachecon",
                "displayName": "ApacheCon (partner copy)"
            }
        ])))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/api/user/admin/groups/course:math"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "course:math",
            "displayName": "Math"
        })))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/api/members/course:math"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "id": USER, "displayName": "John Doe" }
        ])))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .with_priority(10)
        .mount(server)
        .await;
}
