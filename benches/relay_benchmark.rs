use criterion::{Criterion, Throughput, black_box, criterion_group, criterion_main};
use serde_json::json;
use tokio::sync::mpsc;

use tablerelay::signaling::{
    ClientEvent, ConnectionId, Hub, JoinRequest, OutboundMessage, Payload, Relay,
};

/// relay with one room ("bench") holding a host and `guests` guests
fn populated_relay(guests: usize) -> (Relay, Hub, Vec<mpsc::UnboundedReceiver<OutboundMessage>>) {
    let mut relay = Relay::new();
    let mut hub = Hub::new();
    let mut receivers = Vec::new();

    for i in 0..=guests {
        let (tx, rx) = mpsc::unbounded_channel();
        let conn = ConnectionId::from(format!("conn_{:016x}", i));
        hub.register(conn.clone(), tx);
        receivers.push(rx);

        let req = if i == 0 {
            JoinRequest::host("bench", "")
        } else {
            JoinRequest::guest("bench", "")
        };
        relay.join(&mut hub, &conn, &req).unwrap();
    }

    (relay, hub, receivers)
}

fn signal_payload() -> Payload {
    json!({
        "room": "bench",
        "target": format!("conn_{:016x}", 0),
        "sender": format!("conn_{:016x}", 1),
        "sdp": {"type": "offer", "sdp": "v=0\r\no=- 46117317 2 IN IP4 127.0.0.1\r\n"},
    })
    .as_object()
    .cloned()
    .unwrap()
}

/// signal forwarding benchmark
fn bench_signal(c: &mut Criterion) {
    let (relay, mut hub, mut receivers) = populated_relay(8);
    let payload = signal_payload();

    let mut group = c.benchmark_group("Signal");
    group.throughput(Throughput::Elements(1));

    group.bench_function("forward", |b| {
        b.iter(|| {
            relay
                .signal(&mut hub, black_box(payload.clone()))
                .unwrap();
            black_box(receivers[0].try_recv().unwrap());
        })
    });

    group.finish();
}

/// join dispatch benchmark (idempotent re-join, the common hot path)
fn bench_join(c: &mut Criterion) {
    let (mut relay, mut hub, mut receivers) = populated_relay(8);
    let guest = ConnectionId::from(format!("conn_{:016x}", 1));
    let event = ClientEvent::Join(JoinRequest::guest("bench", ""));

    let mut group = c.benchmark_group("Join");
    group.throughput(Throughput::Elements(1));

    group.bench_function("rejoin", |b| {
        b.iter(|| {
            relay.handle_event(&mut hub, &guest, black_box(event.clone()));
            black_box(receivers[1].try_recv().unwrap());
        })
    });

    group.finish();
}

/// host disconnect benchmark: build a room then tear it down
fn bench_disconnect(c: &mut Criterion) {
    let mut group = c.benchmark_group("Disconnect");
    group.throughput(Throughput::Elements(1));

    group.bench_function("host_leaves", |b| {
        b.iter_with_setup(
            || populated_relay(8),
            |(mut relay, _hub, _receivers)| {
                let host = ConnectionId::from(format!("conn_{:016x}", 0));
                black_box(relay.disconnect(&host));
            },
        )
    });

    group.finish();
}

criterion_group!(benches, bench_signal, bench_join, bench_disconnect);
criterion_main!(benches);
