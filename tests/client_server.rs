//! End-to-end calls over the in-process channel transport.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use wirecall::adapters::json::JsonAdapter;
use wirecall::envelope::Request;
use wirecall::transport::channel::ChannelTransport;
use wirecall::{
    ExceptionKind, RpcClient, RpcError, RpcKind, RpcObject, RpcServer, Transport, TransportChannel,
};

fn spawn_server(
    mut server: RpcServer<JsonAdapter>,
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

fn make_server() -> RpcServer<JsonAdapter> {
    let mut server = RpcServer::new();
    server.bind("Sum", |(a, b): &mut (i64, i64)| *a + *b);
    server.bind("AddOneToEach", |(vec,): &mut (Vec<u64>,)| {
        for n in vec.iter_mut() {
            *n += 1;
        }
        vec.len() as u64
    });
    server.bind_try("ThrowError", |_: &mut ()| -> Result<(), String> {
        Err(String::from("Ran into a problem!"))
    });
    server
}

#[test]
fn basic_call() {
    let (client_end, server_end) = ChannelTransport::pair();
    let handle = spawn_server(make_server(), server_end);

    let mut client = RpcClient::<JsonAdapter, _>::new(client_end);
    let sum: i64 = client.call_func("Sum", (40i64, 2i64)).unwrap();
    assert_eq!(sum, 42);

    drop(client);
    handle.join().unwrap();
}

#[test]
fn bind_by_reference_rebinds_arguments() {
    let (client_end, server_end) = ChannelTransport::pair();
    let handle = spawn_server(make_server(), server_end);

    let mut client = RpcClient::<JsonAdapter, _>::new(client_end);
    let mut args = (vec![1u64, 2, 3, 4, 5],);
    let count: u64 = client.call_func_w_bind("AddOneToEach", &mut args).unwrap();
    assert_eq!(count, 5);
    assert_eq!(args.0, vec![2, 3, 4, 5, 6]);

    drop(client);
    handle.join().unwrap();
}

#[test]
fn plain_call_does_not_echo_arguments() {
    let mut server = make_server();
    let request = RpcObject::<JsonAdapter>::of_request(Request {
        is_callback: false,
        func_name: "AddOneToEach".into(),
        bind_args: false,
        args: (vec![1u64, 2, 3],),
    })
    .unwrap();
    let response = server.dispatch(&request.to_bytes().unwrap());
    let parsed = RpcObject::<JsonAdapter>::parse_bytes(&response).unwrap();
    assert_eq!(parsed.kind().unwrap(), RpcKind::FuncResult);
    assert_eq!(parsed.get_result::<u64>().unwrap(), 3);
}

#[test]
fn unbound_function_errors_on_both_sides() {
    let mut server = make_server();
    let request = RpcObject::<JsonAdapter>::of_request(Request {
        is_callback: false,
        func_name: "NoSuchFunc".into(),
        bind_args: false,
        args: (),
    })
    .unwrap();
    let response = server.dispatch(&request.to_bytes().unwrap());
    let parsed = RpcObject::<JsonAdapter>::parse_bytes(&response).unwrap();
    assert!(parsed.is_error());
    assert_eq!(parsed.func_name().unwrap(), "NoSuchFunc");
    assert_eq!(
        parsed.get_error_kind().unwrap(),
        ExceptionKind::FunctionNotFound
    );

    let (client_end, server_end) = ChannelTransport::pair();
    let handle = spawn_server(server, server_end);
    let mut client = RpcClient::<JsonAdapter, _>::new(client_end);
    let err = client.call_func::<(), _>("NoSuchFunc", ()).unwrap_err();
    assert!(matches!(err, RpcError::FunctionNotFound(_)));
    drop(client);
    handle.join().unwrap();
}

#[test]
fn remote_error_is_reraised() {
    let (client_end, server_end) = ChannelTransport::pair();
    let handle = spawn_server(make_server(), server_end);

    let mut client = RpcClient::<JsonAdapter, _>::new(client_end);
    let err = client.call_func::<(), _>("ThrowError", ()).unwrap_err();
    match err {
        RpcError::RemoteExec(mesg) => assert_eq!(mesg, "Ran into a problem!"),
        other => panic!("expected a remote execution error, got {other:?}"),
    }

    drop(client);
    handle.join().unwrap();
}

#[test]
fn cached_binding_runs_once_per_distinct_request() {
    let calls = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&calls);
    let mut server = RpcServer::<JsonAdapter>::new();
    server.bind_cached("Square", move |(n,): &mut (i64,)| {
        seen.fetch_add(1, Ordering::SeqCst);
        *n * *n
    });

    let request = |n: i64| {
        RpcObject::<JsonAdapter>::of_request(Request {
            is_callback: false,
            func_name: "Square".into(),
            bind_args: false,
            args: (n,),
        })
        .unwrap()
        .to_bytes()
        .unwrap()
    };

    let first = server.dispatch(&request(12));
    let second = server.dispatch(&request(12));
    assert_eq!(first, second);
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    server.dispatch(&request(13));
    assert_eq!(calls.load(Ordering::SeqCst), 2);

    server.clear_cache("Square");
    server.dispatch(&request(12));
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[test]
fn errors_are_never_cached() {
    let calls = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&calls);
    let mut server = RpcServer::<JsonAdapter>::new();
    server.bind_cached("Half", move |(n,): &mut (i64,)| {
        seen.fetch_add(1, Ordering::SeqCst);
        *n / 2
    });

    // Wrong argument shape fails before the handler runs; neither the
    // failure nor anything else lands in the cache.
    let bad = RpcObject::<JsonAdapter>::of_request(Request {
        is_callback: false,
        func_name: "Half".into(),
        bind_args: false,
        args: (String::from("not a number"),),
    })
    .unwrap()
    .to_bytes()
    .unwrap();
    let first = RpcObject::<JsonAdapter>::parse_bytes(&server.dispatch(&bad)).unwrap();
    assert!(first.is_error());
    let second = RpcObject::<JsonAdapter>::parse_bytes(&server.dispatch(&bad)).unwrap();
    assert!(second.is_error());
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[test]
fn garbage_input_yields_a_server_receive_envelope() {
    let mut server = make_server();
    let response = server.dispatch(b"complete nonsense");
    let parsed = RpcObject::<JsonAdapter>::parse_bytes(&response).unwrap();
    assert!(parsed.is_error());
    assert_eq!(
        parsed.get_error_kind().unwrap(),
        ExceptionKind::ServerReceive
    );
}

#[test]
fn unbinding_removes_the_function() {
    let mut server = make_server();
    assert!(server.unbind("Sum"));
    assert!(!server.unbind("Sum"));

    let request = RpcObject::<JsonAdapter>::of_request(Request {
        is_callback: false,
        func_name: "Sum".into(),
        bind_args: false,
        args: (1i64, 2i64),
    })
    .unwrap();
    let response = server.dispatch(&request.to_bytes().unwrap());
    let parsed = RpcObject::<JsonAdapter>::parse_bytes(&response).unwrap();
    assert_eq!(
        parsed.get_error_kind().unwrap(),
        ExceptionKind::FunctionNotFound
    );
}
