//! Callback negotiation and nested server-to-client calls.

use std::thread::JoinHandle;

use wirecall::adapters::binary::BinaryAdapter;
use wirecall::envelope::InstallRequest;
use wirecall::transport::channel::ChannelTransport;
use wirecall::{
    ExceptionKind, RpcClient, RpcError, RpcObject, RpcServer, Transport, TransportChannel,
};

fn make_server() -> RpcServer<BinaryAdapter> {
    let mut server = RpcServer::new();
    server.bind_with_context("GetConnectionInfo", |ctx, _: &mut ()| {
        let name: String = ctx.call_callback("GetClientName", ())?;
        Ok(format!("Connected to: {name}"))
    });
    server.bind_with_context("CountdownFrom", |ctx, (start,): &mut (u64,)| {
        let mut remaining = (*start,);
        while remaining.0 > 0 {
            ctx.call_callback_w_bind::<(), _>("Decrement", &mut remaining)?;
        }
        Ok(remaining.0)
    });
    server
}

fn spawn_server(
    mut server: RpcServer<BinaryAdapter>,
    mut transport: ChannelTransport,
) -> JoinHandle<()> {
    std::thread::spawn(move || loop {
        let Ok(request) = transport.receive() else { break };
        let response = {
            let mut channel = TransportChannel(&mut transport);
            server.dispatch_with(&mut channel, &request)
        };
        if transport.send(&response).is_err() {
            break;
        }
    })
}

#[test]
fn server_calls_back_into_the_client() {
    let (client_end, server_end) = ChannelTransport::pair();
    let handle = spawn_server(make_server(), server_end);

    let mut client = RpcClient::<BinaryAdapter, _>::new(client_end);
    client
        .install_callback("GetClientName", |_: &mut ()| String::from("MyClient"))
        .unwrap();
    assert!(client.has_callback("GetClientName"));

    let info: String = client.call_func("GetConnectionInfo", ()).unwrap();
    assert_eq!(info, "Connected to: MyClient");

    drop(client);
    handle.join().unwrap();
}

#[test]
fn callback_with_bound_arguments_mutates_client_state() {
    let (client_end, server_end) = ChannelTransport::pair();
    let handle = spawn_server(make_server(), server_end);

    let mut client = RpcClient::<BinaryAdapter, _>::new(client_end);
    client
        .install_callback("Decrement", |(n,): &mut (u64,)| {
            *n -= 1;
        })
        .unwrap();

    let landed: u64 = client.call_func("CountdownFrom", (3u64,)).unwrap();
    assert_eq!(landed, 0);

    drop(client);
    handle.join().unwrap();
}

#[test]
fn calling_a_missing_callback_fails() {
    let (client_end, server_end) = ChannelTransport::pair();
    let handle = spawn_server(make_server(), server_end);

    let mut client = RpcClient::<BinaryAdapter, _>::new(client_end);
    let err = client
        .call_func::<String, _>("GetConnectionInfo", ())
        .unwrap_err();
    assert!(matches!(err, RpcError::CallbackMissing(_)));

    drop(client);
    handle.join().unwrap();
}

#[test]
fn uninstall_revokes_the_callback() {
    let (client_end, server_end) = ChannelTransport::pair();
    let handle = spawn_server(make_server(), server_end);

    let mut client = RpcClient::<BinaryAdapter, _>::new(client_end);
    let installed = client
        .install_callback("GetClientName", |_: &mut ()| String::from("MyClient"))
        .unwrap();
    client.uninstall_callback(installed).unwrap();
    assert!(!client.has_callback("GetClientName"));

    let err = client
        .call_func::<String, _>("GetConnectionInfo", ())
        .unwrap_err();
    assert!(matches!(err, RpcError::CallbackMissing(_)));

    drop(client);
    handle.join().unwrap();
}

#[test]
fn duplicate_local_install_is_rejected() {
    let (client_end, server_end) = ChannelTransport::pair();
    let handle = spawn_server(make_server(), server_end);

    let mut client = RpcClient::<BinaryAdapter, _>::new(client_end);
    client
        .install_callback("GetClientName", |_: &mut ()| String::from("MyClient"))
        .unwrap();
    let err = client
        .install_callback("GetClientName", |_: &mut ()| String::from("Another"))
        .unwrap_err();
    assert!(matches!(err, RpcError::CallbackInstall(_)));
    assert!(client.has_callback("GetClientName"));

    drop(client);
    handle.join().unwrap();
}

#[test]
fn duplicate_install_is_rejected_in_band() {
    let mut server = make_server();
    let install = RpcObject::<BinaryAdapter>::of_install(InstallRequest {
        func_name: "GetClientName".into(),
        is_uninstall: false,
    })
    .unwrap()
    .to_bytes()
    .unwrap();

    // First install is acknowledged by echoing the request.
    assert_eq!(server.dispatch(&install), install);
    assert!(server.has_callback("GetClientName"));

    let rejection = RpcObject::<BinaryAdapter>::parse_bytes(&server.dispatch(&install)).unwrap();
    assert!(rejection.is_error());
    assert_eq!(
        rejection.get_error_kind().unwrap(),
        ExceptionKind::CallbackInstall
    );

    // Uninstall is also an echo ack and frees the name.
    let uninstall = RpcObject::<BinaryAdapter>::of_install(InstallRequest {
        func_name: "GetClientName".into(),
        is_uninstall: true,
    })
    .unwrap()
    .to_bytes()
    .unwrap();
    assert_eq!(server.dispatch(&uninstall), uninstall);
    assert!(!server.has_callback("GetClientName"));
    assert_eq!(server.dispatch(&install), install);
}

#[test]
fn fallible_callback_errors_reach_the_handler() {
    let (client_end, server_end) = ChannelTransport::pair();
    let handle = spawn_server(make_server(), server_end);

    let mut client = RpcClient::<BinaryAdapter, _>::new(client_end);
    client
        .install_callback_try("GetClientName", |_: &mut ()| -> Result<String, String> {
            Err(String::from("client is anonymous"))
        })
        .unwrap();

    let err = client
        .call_func::<String, _>("GetConnectionInfo", ())
        .unwrap_err();
    match err {
        RpcError::RemoteExec(mesg) => assert_eq!(mesg, "client is anonymous"),
        other => panic!("expected a remote execution error, got {other:?}"),
    }

    drop(client);
    handle.join().unwrap();
}
