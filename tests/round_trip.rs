//! Envelope round trips through both shipped adapters.

use rand::Rng;
use wirecall::adapters::binary::BinaryAdapter;
use wirecall::adapters::json::JsonAdapter;
use wirecall::envelope::{ErrorReply, InstallRequest, Reply, ReplyWithBind, Request};
use wirecall::{ExceptionKind, RpcError, RpcKind, RpcObject, SerialAdapter};

fn reparse<S: SerialAdapter>(obj: &RpcObject<S>) -> RpcObject<S> {
    RpcObject::parse_bytes(&obj.to_bytes().unwrap()).unwrap()
}

fn check_all_kinds<S: SerialAdapter>() {
    // FuncRequest / CallbackRequest
    for is_callback in [false, true] {
        let obj = RpcObject::<S>::of_request(Request {
            is_callback,
            func_name: "Echo".into(),
            bind_args: false,
            args: (7i64, String::from("hi")),
        })
        .unwrap();
        let parsed = reparse(&obj);
        let expected = if is_callback {
            RpcKind::CallbackRequest
        } else {
            RpcKind::FuncRequest
        };
        assert_eq!(parsed.kind().unwrap(), expected);
        assert_eq!(parsed.func_name().unwrap(), "Echo");
        assert!(!parsed.has_bound_args().unwrap());
        assert!(!parsed.is_error());
        assert_eq!(
            parsed.get_args::<(i64, String)>().unwrap(),
            (7, String::from("hi"))
        );
    }

    // FuncResult / CallbackResult
    for is_callback in [false, true] {
        let obj = RpcObject::<S>::of_reply(Reply {
            is_callback,
            func_name: "Echo".into(),
            result: String::from("back"),
        })
        .unwrap();
        let parsed = reparse(&obj);
        let expected = if is_callback {
            RpcKind::CallbackResult
        } else {
            RpcKind::FuncResult
        };
        assert_eq!(parsed.kind().unwrap(), expected);
        assert_eq!(parsed.get_result::<String>().unwrap(), "back");
    }

    // FuncResultWithBind / CallbackResultWithBind
    for is_callback in [false, true] {
        let obj = RpcObject::<S>::of_reply_with_bind(ReplyWithBind {
            is_callback,
            func_name: "AddOneToEach".into(),
            result: 4u64,
            args: (vec![2u64, 3, 4, 5],),
        })
        .unwrap();
        let parsed = reparse(&obj);
        let expected = if is_callback {
            RpcKind::CallbackResultWithBind
        } else {
            RpcKind::FuncResultWithBind
        };
        assert_eq!(parsed.kind().unwrap(), expected);
        assert!(parsed.has_bound_args().unwrap());
        assert_eq!(parsed.get_result::<u64>().unwrap(), 4);
        assert_eq!(parsed.get_args::<(Vec<u64>,)>().unwrap().0, vec![2, 3, 4, 5]);
    }

    // FuncError / CallbackError
    for is_callback in [false, true] {
        let relayed = RpcError::RemoteExec(String::from("Ran into a problem!"));
        let obj =
            RpcObject::<S>::of_error(ErrorReply::new(is_callback, "Throw", &relayed)).unwrap();
        let parsed = reparse(&obj);
        let expected = if is_callback {
            RpcKind::CallbackError
        } else {
            RpcKind::FuncError
        };
        assert_eq!(parsed.kind().unwrap(), expected);
        assert!(parsed.is_error());
        assert_eq!(parsed.get_error_kind().unwrap(), ExceptionKind::RemoteExec);
        assert_eq!(parsed.get_error_mesg().unwrap(), "Ran into a problem!");
        assert_eq!(parsed.get_result::<i64>().unwrap_err(), relayed);
    }

    // CallbackInstallRequest
    for is_uninstall in [false, true] {
        let obj = RpcObject::<S>::of_install(InstallRequest {
            func_name: "GetClientName".into(),
            is_uninstall,
        })
        .unwrap();
        let parsed = reparse(&obj);
        assert_eq!(parsed.kind().unwrap(), RpcKind::CallbackInstallRequest);
        assert_eq!(parsed.is_callback_uninstall().unwrap(), is_uninstall);
    }
}

#[test]
fn all_kinds_round_trip_json() {
    check_all_kinds::<JsonAdapter>();
}

#[test]
fn all_kinds_round_trip_binary() {
    check_all_kinds::<BinaryAdapter>();
}

#[test]
fn binary_round_trip_is_byte_identical() {
    let obj = RpcObject::<BinaryAdapter>::of_request(Request {
        is_callback: false,
        func_name: "Echo".into(),
        bind_args: true,
        args: (vec![1i64, 2, 3], 0.5f64),
    })
    .unwrap();
    let bytes = obj.to_bytes().unwrap();
    let reparsed = RpcObject::<BinaryAdapter>::parse_bytes(&bytes).unwrap();
    assert_eq!(reparsed.to_bytes().unwrap(), bytes);
}

fn check_mismatched_accessors<S: SerialAdapter>() {
    let request = RpcObject::<S>::of_request(Request {
        is_callback: false,
        func_name: "Echo".into(),
        bind_args: false,
        args: (1i64,),
    })
    .unwrap();
    assert!(matches!(
        request.get_result::<i64>(),
        Err(RpcError::KindMismatch(_))
    ));
    assert!(matches!(
        request.is_callback_uninstall(),
        Err(RpcError::KindMismatch(_))
    ));
    assert!(matches!(
        request.get_error_kind(),
        Err(RpcError::KindMismatch(_))
    ));

    let reply = RpcObject::<S>::of_reply(Reply {
        is_callback: false,
        func_name: "Echo".into(),
        result: 1i64,
    })
    .unwrap();
    assert!(matches!(
        reply.get_args::<(i64,)>(),
        Err(RpcError::KindMismatch(_))
    ));
    assert!(matches!(
        reply.has_bound_args(),
        Err(RpcError::KindMismatch(_))
    ));
}

#[test]
fn mismatched_accessors_json() {
    check_mismatched_accessors::<JsonAdapter>();
}

#[test]
fn mismatched_accessors_binary() {
    check_mismatched_accessors::<BinaryAdapter>();
}

#[test]
fn malformed_bytes_parse_to_none() {
    for bytes in [&b""[..], &b"garbage"[..], &b"{\"no\":\"name\"}"[..]] {
        assert!(RpcObject::<JsonAdapter>::parse_bytes(bytes).is_none());
        assert!(RpcObject::<BinaryAdapter>::parse_bytes(bytes).is_none());
    }
}

#[test]
fn random_vectors_round_trip() {
    let mut rng = rand::thread_rng();
    for _ in 0..32 {
        let len = rng.gen_range(0..64);
        let values: Vec<i64> = (0..len).map(|_| rng.gen()).collect();
        let obj = RpcObject::<BinaryAdapter>::of_reply(Reply {
            is_callback: false,
            func_name: "Rand".into(),
            result: values.clone(),
        })
        .unwrap();
        let parsed = RpcObject::<BinaryAdapter>::parse_bytes(&obj.to_bytes().unwrap()).unwrap();
        assert_eq!(parsed.get_result::<Vec<i64>>().unwrap(), values);
    }
}
