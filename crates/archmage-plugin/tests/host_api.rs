// End-to-end tests of the extension-facing surface.
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use archmage_plugin::{
    ApiError, Arg, ChainId, Command, Disposable, EventEmitter, Host, HostConfig, Index, NetworkKind,
};
use serde_json::json;

fn host() -> Host {
    Host::new(HostConfig::default()).unwrap()
}

#[tokio::test]
async fn extensions_share_commands_through_the_host() {
    let host = host();
    let mut provider = host.activate("acme.provider").unwrap();
    let consumer = host.activate("acme.consumer").unwrap();

    let registration = provider
        .commands()
        .register_command("acme.greet", |args: Vec<Arg>| async move {
            match args.first().and_then(Arg::as_str) {
                Some(name) => Ok(Arg::String(format!("hello {name}"))),
                None => Err(ApiError::handler("acme.greet", "missing name")),
            }
        })
        .unwrap();
    provider.subscriptions.push(registration);

    let greeting = consumer
        .commands()
        .execute_command("acme.greet", vec![Arg::from("ada")])
        .await
        .unwrap();
    assert_eq!(greeting, Arg::String("hello ada".into()));

    let err = consumer
        .commands()
        .execute_command("acme.greet", vec![])
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::HandlerFailed { .. }));

    assert_eq!(consumer.commands().get_commands(true), vec!["acme.greet"]);

    provider.deactivate().unwrap();
    let err = consumer
        .commands()
        .execute_command("acme.greet", vec![Arg::from("ada")])
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::UnknownCommand(_)));
}

#[tokio::test]
async fn duplicate_registration_is_first_wins_until_disposed() {
    let host = host();
    let first = host.activate("acme.one").unwrap();
    let second = host.activate("acme.two").unwrap();

    let handle = first
        .commands()
        .register_command("a", |_| async { Ok(Arg::from("one")) })
        .unwrap();
    let err = second
        .commands()
        .register_command("a", |_| async { Ok(Arg::from("two")) })
        .unwrap_err();
    assert!(matches!(err, ApiError::DuplicateCommand(_)));

    handle.dispose();
    second
        .commands()
        .register_command("a", |_| async { Ok(Arg::from("two")) })
        .unwrap();

    // The stale handle from the first registration must not remove it.
    handle.dispose();
    let value = host.commands().execute_command("a", vec![]).await.unwrap();
    assert_eq!(value, Arg::from("two"));
}

#[tokio::test]
async fn internal_commands_reject_structured_arguments_from_extensions() {
    let host = host();
    let calls = Arc::new(AtomicUsize::new(0));
    let c = calls.clone();
    let _internal = host
        .commands()
        .register_command("_host.refresh", move |_| {
            c.fetch_add(1, Ordering::SeqCst);
            async { Ok(Arg::Undefined) }
        })
        .unwrap();

    let ext = host.activate("acme.wallet").unwrap();
    let err = ext
        .commands()
        .execute_command("_host.refresh", vec![Arg::Value(json!({"force": true}))])
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::InvalidArgument { position: 0, .. }));
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    ext.commands()
        .execute_command("_host.refresh", vec![Arg::Bool(true), Arg::Null])
        .await
        .unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn command_reference_runs_its_arguments() {
    let host = host();
    let ext = host.activate("acme.palette").unwrap();
    let _h = ext
        .commands()
        .register_command("acme.sum", |args: Vec<Arg>| async move {
            Ok(Arg::Number(args.iter().filter_map(Arg::as_f64).sum()))
        })
        .unwrap();

    let command = Command::parse(
        r#"{"title":"Sum","command":"acme.sum","tooltip":"Adds numbers","arguments":[1,2,3.5]}"#,
    )
    .unwrap();
    assert_eq!(command.execute(ext.commands()).await.unwrap(), Arg::Number(6.5));
}

#[test]
fn listener_failures_are_isolated_and_ordered() {
    let emitter = EventEmitter::<u32>::named("test");
    let seen = Arc::new(Mutex::new(Vec::new()));
    let mut subscriptions = Vec::new();

    emitter
        .event()
        .subscribe_into(|_| panic!("L1 failed"), &mut subscriptions);
    for name in ["L2", "L3"] {
        let seen = seen.clone();
        emitter.event().subscribe_into(
            move |v: &u32| seen.lock().unwrap().push((name, *v)),
            &mut subscriptions,
        );
    }

    let outcome = emitter.fire(&9);
    assert_eq!(outcome.failures.len(), 1);
    assert_eq!(*seen.lock().unwrap(), vec![("L2", 9), ("L3", 9)]);

    Disposable::from_all(subscriptions).dispose();
    assert_eq!(emitter.listener_count(), 0);
}

#[test]
fn account_lifecycle_through_extension_context() {
    let host = host();
    let mut ctx = host.activate("acme.wallet").unwrap();
    let accounts = ctx.accounts().clone();

    let activations = Arc::new(AtomicUsize::new(0));
    let a = activations.clone();
    accounts.on_did_change().subscribe_into(
        move |change| {
            if matches!(change, archmage_plugin::AccountChange::AccountActivated { .. }) {
                a.fetch_add(1, Ordering::SeqCst);
            }
        },
        &mut ctx.subscriptions,
    );

    let hd = accounts.create_wallet("hd").unwrap();
    let subs: Vec<_> = (0..3)
        .map(|i| accounts.add_sub_wallet(hd.id, Index::Derived(i), None).unwrap())
        .collect();
    assert!(accounts.add_sub_wallet(hd.id, Index::Derived(1), None).is_err());

    let single = accounts.create_wallet("single").unwrap();
    let only = accounts.add_sub_wallet(single.id, Index::Pseudo, None).unwrap();
    assert!(accounts
        .add_sub_wallet(single.id, Index::Derived(0), None)
        .is_err());

    let network = accounts
        .add_network(NetworkKind::Evm, ChainId::Numeric(1))
        .unwrap();
    for sub in subs.iter().chain([&only]) {
        let account = accounts.chain_account(sub.id, network.id).unwrap();
        assert_eq!(account.index, sub.index);
        assert!(account.address.is_none());
    }

    accounts
        .activate_account(only.id, network.id, "0x00000000000000000000000000000000000000aa")
        .unwrap();
    assert_eq!(activations.load(Ordering::SeqCst), 1);
    assert!(accounts
        .chain_account(subs[0].id, network.id)
        .unwrap()
        .address
        .is_none());

    ctx.deactivate().unwrap();
    accounts
        .activate_account(subs[0].id, network.id, "0xbb")
        .unwrap();
    assert_eq!(activations.load(Ordering::SeqCst), 1);
}
