pub mod api_client;
pub mod rpc_gateway;
