mod common;

use common::ScriptedTransport;
use proctrace::channel::{ChannelError, ChannelManager};
use proctrace_common::{McastOp, CN_IDX_PROC};

#[test]
fn open_binds_to_pid_and_subscribes() {
    let transport = ScriptedTransport::new();
    let log = transport.log();
    let mut channel = ChannelManager::with_pid(transport, 777);

    channel.open().unwrap();

    assert!(channel.is_open());
    assert!(channel.is_subscribed());
    let log = log.lock().unwrap();
    assert_eq!(log.created, 1);
    assert_eq!(log.bound, vec![(1, 777, CN_IDX_PROC)]);
    assert_eq!(log.ops(), vec![McastOp::Listen]);
    assert_eq!(log.sent[0].1.header.pid, 777);
}

#[test]
fn reopen_leaves_exactly_one_endpoint() {
    let transport = ScriptedTransport::new();
    let log = transport.log();
    let mut channel = ChannelManager::with_pid(transport, 1);

    channel.open().unwrap();
    channel.open().unwrap();

    {
        let log = log.lock().unwrap();
        assert_eq!(log.created, 2);
        assert_eq!(log.released, 1);
        assert_eq!(log.open.iter().copied().collect::<Vec<_>>(), vec![2]);
        // listen on 1, ignore on 1, listen on 2
        let sent: Vec<_> = log.sent.iter().map(|(ep, req)| (*ep, req.op)).collect();
        assert_eq!(
            sent,
            vec![(1, McastOp::Listen), (1, McastOp::Ignore), (2, McastOp::Listen)]
        );
    }
    assert!(channel.is_subscribed());
}

#[test]
fn close_is_idempotent_and_drop_does_not_release_twice() {
    let transport = ScriptedTransport::new();
    let log = transport.log();
    let mut channel = ChannelManager::with_pid(transport, 1);

    channel.open().unwrap();
    channel.close();
    channel.close();
    assert!(!channel.is_open());
    drop(channel);

    let log = log.lock().unwrap();
    assert_eq!(log.released, 1);
    assert!(log.open.is_empty());
    assert_eq!(log.ops(), vec![McastOp::Listen, McastOp::Ignore]);
}

#[test]
fn closing_a_never_opened_channel_is_a_no_op() {
    let transport = ScriptedTransport::new();
    let log = transport.log();
    let mut channel = ChannelManager::with_pid(transport, 1);
    channel.close();
    drop(channel);

    let log = log.lock().unwrap();
    assert_eq!(log.released, 0);
    assert!(log.sent.is_empty());
}

#[test]
fn drop_tears_down_an_open_channel() {
    let transport = ScriptedTransport::new();
    let log = transport.log();
    {
        let mut channel = ChannelManager::with_pid(transport, 1);
        channel.open().unwrap();
    }
    let log = log.lock().unwrap();
    assert_eq!(log.released, 1);
    assert_eq!(log.ops(), vec![McastOp::Listen, McastOp::Ignore]);
}

#[test]
fn unprivileged_open_is_refused_before_any_syscall() {
    let mut transport = ScriptedTransport::new();
    transport.privileged = false;
    let log = transport.log();
    let mut channel = ChannelManager::with_pid(transport, 1);

    assert!(matches!(channel.open(), Err(ChannelError::PermissionDenied)));
    assert_eq!(log.lock().unwrap().created, 0);
}

#[test]
fn socket_creation_failure_is_reported() {
    let mut transport = ScriptedTransport::new();
    transport.fail_create = true;
    let mut channel = ChannelManager::with_pid(transport, 1);

    let err = channel.open().unwrap_err();
    assert!(matches!(err, ChannelError::SocketCreateFailed(_)));
    assert!(!channel.is_open());
}

#[test]
fn bind_failure_releases_the_socket() {
    let mut transport = ScriptedTransport::new();
    transport.fail_bind = true;
    let log = transport.log();
    let mut channel = ChannelManager::with_pid(transport, 1);

    let err = channel.open().unwrap_err();
    assert!(matches!(err, ChannelError::BindFailed(_)));
    assert!(!channel.is_open());
    let log = log.lock().unwrap();
    assert_eq!(log.created, 1);
    assert_eq!(log.released, 1);
    assert!(log.open.is_empty());
}

#[test]
fn subscribe_failure_releases_the_socket() {
    let mut transport = ScriptedTransport::new();
    transport.fail_send = true;
    let log = transport.log();
    let mut channel = ChannelManager::with_pid(transport, 1);

    let err = channel.open().unwrap_err();
    assert!(matches!(err, ChannelError::SubscribeFailed(_)));
    assert!(err.to_string().contains("subscribe"));
    assert!(!channel.is_subscribed());
    assert_eq!(log.lock().unwrap().released, 1);
}

#[test]
fn failed_release_is_swallowed() {
    let mut transport = ScriptedTransport::new();
    transport.fail_release = true;
    let log = transport.log();
    let mut channel = ChannelManager::with_pid(transport, 1);

    channel.open().unwrap();
    channel.close();
    channel.close();
    assert!(!channel.is_open());
    assert_eq!(log.lock().unwrap().released, 1);
}

#[test]
fn subscribe_toggles_on_open_channel_only() {
    let transport = ScriptedTransport::new();
    let log = transport.log();
    let mut channel = ChannelManager::with_pid(transport, 1);

    assert!(matches!(
        channel.subscribe(true),
        Err(ChannelError::NotConnected)
    ));

    channel.open().unwrap();
    channel.subscribe(false).unwrap();
    assert!(!channel.is_subscribed());
    channel.close();

    // already unsubscribed, so close sends nothing more
    assert_eq!(
        log.lock().unwrap().ops(),
        vec![McastOp::Listen, McastOp::Ignore]
    );
}

#[test]
fn recv_on_closed_channel_is_not_connected() {
    let mut channel = ChannelManager::with_pid(ScriptedTransport::new(), 1);
    let mut buf = [0u8; 16];
    let err = channel.recv(&mut buf).unwrap_err();
    assert_eq!(err.kind(), std::io::ErrorKind::NotConnected);
}
