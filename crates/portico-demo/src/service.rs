//! The `example.Example` service and its HTTP routes.

use std::sync::Arc;

use http::Method;
use portico::gateway::{Gateway, GatewayConfig, UnaryRoute};
use portico::rpc::{MethodTable, Reply, RpcServer, RpcService, ServiceDescriptor};
use tonic::{Request, Response, Status};

use crate::error::DemoError;
use crate::messages::{ItemData, ListItemsReq, ListItemsResp, LoginReq, LoginResp};
use crate::repository::ExampleRepository;

/// Request header forwarded into call metadata.
pub const CUSTOM_HEADER: &str = "X-Custom-Header";

/// Descriptor of `example.Example`.
#[derive(Debug)]
pub struct Example;

impl ServiceDescriptor for Example {
    const NAME: &'static str = "example.Example";
}

/// Handlers of `example.Example`.
#[derive(Clone)]
pub struct ExampleService {
    repo: Arc<dyn ExampleRepository>,
}

impl std::fmt::Debug for ExampleService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExampleService").finish_non_exhaustive()
    }
}

impl ExampleService {
    /// Service backed by `repo`.
    pub fn new(repo: impl ExampleRepository) -> Self {
        Self {
            repo: Arc::new(repo),
        }
    }

    /// Checks the credentials.
    pub async fn login(&self, request: Request<LoginReq>) -> Result<Response<LoginResp>, Status> {
        let reply = Reply::from_request(&request);
        match self.authenticate(request.get_ref()).await {
            Ok(()) => reply.http_status(200).ok(LoginResp {
                status: "success".to_string(),
                description: "ok".to_string(),
            }),
            Err(error) => {
                tracing::error!(error = %error, username = %request.get_ref().username, "login failed");
                reply.http_status(error.http_status()).error(error.into())
            }
        }
    }

    /// Lists the caller's items matching a name.
    pub async fn list_items(
        &self,
        request: Request<ListItemsReq>,
    ) -> Result<Response<ListItemsResp>, Status> {
        let reply = Reply::from_request(&request);
        let req = request.get_ref();
        let items = match self.find_items(req).await {
            Ok(items) => items,
            Err(error) => {
                tracing::error!(error = %error, "list items failed");
                return reply.http_status(error.http_status()).error(error.into());
            }
        };

        reply.ok(ListItemsResp {
            status: "success".to_string(),
            item: items,
        })
    }

    async fn authenticate(&self, req: &LoginReq) -> Result<(), DemoError> {
        req.validate().map_err(DemoError::Validation)?;
        match self.repo.find_member(&req.username).await? {
            Some(member) if member.password == req.password => Ok(()),
            _ => Err(DemoError::Unauthenticated),
        }
    }

    async fn find_items(&self, req: &ListItemsReq) -> Result<Vec<ItemData>, DemoError> {
        req.validate().map_err(DemoError::Validation)?;
        let items = self.repo.list_items(&req.username, &req.item).await?;
        Ok(items
            .into_iter()
            .map(|item| ItemData {
                item_id: item.id,
                item_name: item.name,
                category: item.category,
            })
            .collect())
    }

    /// Method table binding `Login` and `ListItems`.
    pub fn methods(&self) -> MethodTable {
        let login = self.clone();
        let list = self.clone();
        MethodTable::new()
            .unary("Login", move |request: Request<LoginReq>| {
                let service = login.clone();
                async move { service.login(request).await }
            })
            .unary("ListItems", move |request: Request<ListItemsReq>| {
                let service = list.clone();
                async move { service.list_items(request).await }
            })
    }

    /// RPC listener serving this service.
    pub fn rpc_server(&self) -> RpcServer<Example> {
        RpcServer::new(RpcService::new(self.methods()))
    }
}

/// Gateway exposing `example.Example`:
///
/// - `POST /v1/login` takes the whole body;
/// - `GET /v1/users/{username}/items` fills the request from the path and
///   the query string.
pub fn gateway(config: GatewayConfig) -> Gateway {
    Gateway::new(config.forward_header(CUSTOM_HEADER))
        .route(
            Method::POST,
            "/v1/login",
            UnaryRoute::<LoginReq, LoginResp>::new("/example.Example/Login"),
        )
        .route(
            Method::GET,
            "/v1/users/{username}/items",
            UnaryRoute::<ListItemsReq, ListItemsResp>::new("/example.Example/ListItems").query(),
        )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::InMemoryRepository;

    fn service() -> ExampleService {
        ExampleService::new(InMemoryRepository::seeded())
    }

    fn login(username: &str, password: &str) -> Request<LoginReq> {
        Request::new(LoginReq {
            username: username.to_string(),
            password: password.to_string(),
        })
    }

    #[tokio::test]
    async fn test_login() {
        let response = service().login(login("ann", "secret")).await.unwrap();
        assert_eq!(response.get_ref().status, "success");
        assert_eq!(
            portico::rpc::metadata::http_code(response.metadata()),
            Some(http::StatusCode::OK)
        );
    }

    #[tokio::test]
    async fn test_login_failures() {
        let status = service().login(login("ann", "")).await.unwrap_err();
        assert_eq!(status.code(), tonic::Code::InvalidArgument);
        assert_eq!(
            portico::rpc::metadata::http_code(status.metadata()),
            Some(http::StatusCode::BAD_REQUEST)
        );

        let status = service().login(login("ann", "nope")).await.unwrap_err();
        assert_eq!(status.code(), tonic::Code::Unauthenticated);

        let status = service().login(login("carol", "secret")).await.unwrap_err();
        assert_eq!(status.code(), tonic::Code::Unauthenticated);
    }

    #[tokio::test]
    async fn test_list_items() {
        let request = Request::new(ListItemsReq {
            username: "ann".to_string(),
            item: "note".to_string(),
        });
        let response = service().list_items(request).await.unwrap().into_inner();
        assert_eq!(response.status, "success");
        assert_eq!(response.item.len(), 1);
        assert_eq!(response.item[0].item_name, "Notebook");

        let request = Request::new(ListItemsReq {
            username: "ann".to_string(),
            item: String::new(),
        });
        let status = service().list_items(request).await.unwrap_err();
        assert_eq!(status.code(), tonic::Code::InvalidArgument);
    }

    #[test]
    fn test_method_table() {
        let mut names: Vec<_> = service().methods().names().collect();
        names.sort_unstable();
        assert_eq!(names, ["ListItems", "Login"]);
        assert_eq!(RpcService::<Example>::path("Login"), "/example.Example/Login");
    }
}
