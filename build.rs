// Generates the DataGrid client and server stubs.
//
// Messages are hand-derived prost types in `src/protocol.rs`, so no .proto
// compilation (and no protoc) is needed.

fn method(name: &str, route: &str, input: &str, output: &str) -> tonic_build::manual::MethodBuilder {
    tonic_build::manual::Method::builder()
        .name(name)
        .route_name(route)
        .input_type(format!("crate::protocol::{input}"))
        .output_type(format!("crate::protocol::{output}"))
        .codec_path("tonic::codec::ProstCodec")
}

fn main() {
    let service = tonic_build::manual::Service::builder()
        .name("DataGrid")
        .package("grid")
        .method(method("get", "Get", "GetRequest", "GetResponse").build())
        .method(method("put", "Put", "PutRequest", "PutResponse").build())
        .method(method("put_all", "PutAll", "PutAllRequest", "PutAllResponse").build())
        .method(method("size", "Size", "CacheRequest", "SizeResponse").build())
        .method(
            method("key_set", "KeySet", "CacheRequest", "KeyResponse")
                .server_streaming()
                .build(),
        )
        .method(
            method("invoke_all", "InvokeAll", "InvokeAllRequest", "InvokeResult")
                .server_streaming()
                .build(),
        )
        .method(method("invoke", "Invoke", "InvokeRequest", "InvokeResponse").build())
        .method(
            method("listen", "Listen", "CacheRequest", "EventMessage")
                .server_streaming()
                .build(),
        )
        .method(method("heartbeat", "Heartbeat", "HeartbeatRequest", "HeartbeatResponse").build())
        .build();

    tonic_build::manual::Builder::new().compile(&[service]);
}
