mod causal_response;
mod get_request;
mod kvs_response;
mod put_request;
