use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::codec::{Framed, LinesCodec};
use ulid::Ulid;

use slotbook::clock::SystemClock;
use slotbook::engine::BookingService;
use slotbook::facility::load_seed_file;
use slotbook::store::LogStore;
use slotbook::wire;

// ── Test infrastructure ──────────────────────────────────────

const COURT: &str = "01HZY3N2T0CT0000000000000A";
const ROOM: &str = "01HZY3N2T0RM0000000000000B";

fn test_dir() -> PathBuf {
    let dir = std::env::temp_dir().join(format!("slotbook_int_test_{}", Ulid::new()));
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

async fn start_test_server(dir: &PathBuf) -> SocketAddr {
    let seed = dir.join("facilities.json");
    std::fs::write(
        &seed,
        json!([
            {
                "id": COURT,
                "name": "Tennis Court",
                "type": "Facility",
                "operationHours": ["08:00", "18:00"],
            },
            {"id": ROOM, "name": "Meeting Room", "type": "Room"},
        ])
        .to_string(),
    )
    .unwrap();

    let store = Arc::new(LogStore::open(&dir.join("slotbook.wal")).unwrap());
    load_seed_file(store.as_ref(), &seed).await.unwrap();
    let service = Arc::new(BookingService::new(store, Arc::new(SystemClock::utc())));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        loop {
            let (socket, _) = match listener.accept().await {
                Ok(conn) => conn,
                Err(_) => break,
            };
            let service = service.clone();
            tokio::spawn(async move {
                let _ = wire::process_connection(socket, &service).await;
            });
        }
    });
    addr
}

async fn connect(addr: SocketAddr) -> Framed<TcpStream, LinesCodec> {
    Framed::new(TcpStream::connect(addr).await.unwrap(), LinesCodec::new())
}

async fn call(client: &mut Framed<TcpStream, LinesCodec>, request: Value) -> Value {
    client.send(request.to_string()).await.unwrap();
    let line = client.next().await.unwrap().unwrap();
    serde_json::from_str(&line).unwrap()
}

fn create(facility: &str, from: &str, to: &str, email: &str) -> Value {
    json!({"op": "create", "facilityId": facility, "from": from, "to": to, "userEmail": email})
}

// ── Tests ────────────────────────────────────────────────────

#[tokio::test]
async fn booking_lifecycle_over_tcp() {
    let dir = test_dir();
    let addr = start_test_server(&dir).await;
    let mut client = connect(addr).await;

    let created = call(
        &mut client,
        create(COURT, "2099-03-02T09:00", "2099-03-02T10:00", "a@example.com"),
    )
    .await;
    assert_eq!(created["status"], 200);
    assert_eq!(created["data"]["facility"]["name"], "Tennis Court");
    let id = created["data"]["id"].as_str().unwrap().to_string();

    // Same slot, different user: conflict
    let clash = call(
        &mut client,
        create(COURT, "2099-03-02T09:30", "2099-03-02T11:00", "b@example.com"),
    )
    .await;
    assert_eq!(clash["status"], 400);
    assert_eq!(
        clash["message"],
        "Your slot selection is overlap with occupied slots or over operation hours"
    );

    // Touching the existing booking is a conflict too
    let touching = call(
        &mut client,
        create(COURT, "2099-03-02T10:00", "2099-03-02T11:00", "b@example.com"),
    )
    .await;
    assert_eq!(touching["status"], 400);

    let moved = call(
        &mut client,
        json!({"op": "update", "id": id, "from": "2099-03-02T13:00", "to": "2099-03-02T14:00"}),
    )
    .await;
    assert_eq!(moved["status"], 200);
    assert_eq!(moved["data"]["userEmail"], "a@example.com");

    let now_free = call(
        &mut client,
        create(COURT, "2099-03-02T09:30", "2099-03-02T11:00", "b@example.com"),
    )
    .await;
    assert_eq!(now_free["status"], 200);

    let cancelled = call(&mut client, json!({"op": "cancel", "id": id})).await;
    assert_eq!(cancelled, json!({"status": 200, "data": {"message": "Cancel booking successful"}}));

    let gone = call(&mut client, json!({"op": "get", "id": id})).await;
    assert_eq!(gone, json!({"status": 404, "message": "Booking is not found"}));
}

#[tokio::test]
async fn validation_errors_over_tcp() {
    let dir = test_dir();
    let addr = start_test_server(&dir).await;
    let mut client = connect(addr).await;

    let past = call(
        &mut client,
        create(COURT, "2001-03-02T09:00", "2001-03-02T10:00", "a@example.com"),
    )
    .await;
    assert_eq!(past, json!({"status": 400, "message": "From and To should be after current time"}));

    let reversed = call(
        &mut client,
        create(ROOM, "2099-03-02T10:00", "2099-03-02T09:00", "a@example.com"),
    )
    .await;
    assert_eq!(reversed, json!({"status": 400, "message": "From should be before To"}));

    let missing = call(&mut client, json!({"op": "create", "facilityId": ROOM})).await;
    assert_eq!(missing, json!({"status": 400, "message": "Missing fields: from, to, userEmail"}));

    let unknown = Ulid::new().to_string();
    let no_facility = call(
        &mut client,
        create(&unknown, "2099-03-02T09:00", "2099-03-02T10:00", "a@example.com"),
    )
    .await;
    assert_eq!(no_facility["status"], 400);
    assert_eq!(no_facility["message"], format!("Facility cannot be found {unknown}"));

    let after_hours = call(
        &mut client,
        create(COURT, "2099-03-02T17:30", "2099-03-02T18:30", "a@example.com"),
    )
    .await;
    assert_eq!(after_hours["status"], 400);

    // The connection survives garbage
    let garbage = call(&mut client, json!("hello")).await;
    assert_eq!(garbage["status"], 400);
    let ok = call(
        &mut client,
        create(ROOM, "2099-03-02T22:00", "2099-03-02T23:30", "a@example.com"),
    )
    .await;
    assert_eq!(ok["status"], 200);
}

#[tokio::test]
async fn listing_and_availability_over_tcp() {
    let dir = test_dir();
    let addr = start_test_server(&dir).await;
    let mut client = connect(addr).await;

    for (facility, from, to) in [
        (COURT, "2099-03-02T14:00", "2099-03-02T15:00"),
        (COURT, "2099-03-02T09:00", "2099-03-02T10:00"),
        (ROOM, "2099-03-02T09:00", "2099-03-02T10:00"),
    ] {
        let r = call(&mut client, create(facility, from, to, "a@example.com")).await;
        assert_eq!(r["status"], 200);
    }

    let rooms = call(
        &mut client,
        json!({"op": "list_by_user", "userEmail": "a@example.com", "type": "Room"}),
    )
    .await;
    assert_eq!(rooms["data"].as_array().unwrap().len(), 1);
    assert_eq!(rooms["data"][0]["facility"]["type"], "Room");

    let all = call(&mut client, json!({"op": "list_by_user", "userEmail": "a@example.com"})).await;
    assert_eq!(all["data"].as_array().unwrap().len(), 3);

    let court = call(&mut client, json!({"op": "list_by_facility", "facilityId": COURT})).await;
    let starts: Vec<&str> = court["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|b| b["from"].as_str().unwrap())
        .collect();
    assert_eq!(starts, ["2099-03-02T09:00:00", "2099-03-02T14:00:00"]);

    let free = call(
        &mut client,
        json!({"op": "availability", "facilityId": COURT, "day": "2099-03-02"}),
    )
    .await;
    assert_eq!(
        free["data"],
        json!([
            {"start": "2099-03-02T08:00:00", "end": "2099-03-02T09:00:00"},
            {"start": "2099-03-02T10:00:00", "end": "2099-03-02T14:00:00"},
            {"start": "2099-03-02T15:00:00", "end": "2099-03-02T18:00:00"},
        ])
    );
}

#[tokio::test]
async fn bookings_survive_restart() {
    let dir = test_dir();
    let id = {
        let addr = start_test_server(&dir).await;
        let mut client = connect(addr).await;
        let r = call(
            &mut client,
            create(COURT, "2099-03-02T09:00", "2099-03-02T10:00", "a@example.com"),
        )
        .await;
        r["data"]["id"].as_str().unwrap().to_string()
    };

    // A second server over the same data directory replays the log
    let addr = start_test_server(&dir).await;
    let mut client = connect(addr).await;
    let got = call(&mut client, json!({"op": "get", "id": id})).await;
    assert_eq!(got["status"], 200);
    assert_eq!(got["data"]["facility"]["name"], "Tennis Court");

    let clash = call(
        &mut client,
        create(COURT, "2099-03-02T09:00", "2099-03-02T10:00", "b@example.com"),
    )
    .await;
    assert_eq!(clash["status"], 400);
}

#[tokio::test]
async fn concurrent_clients_cannot_double_book() {
    let dir = test_dir();
    let addr = start_test_server(&dir).await;

    let mut handles = Vec::new();
    for i in 0..16 {
        handles.push(tokio::spawn(async move {
            let mut client = connect(addr).await;
            let email = format!("user{i}@example.com");
            let r = call(
                &mut client,
                create(COURT, "2099-03-03T09:00", "2099-03-03T10:00", &email),
            )
            .await;
            r["status"] == 200
        }));
    }
    let mut accepted = 0;
    for h in handles {
        if h.await.unwrap() {
            accepted += 1;
        }
    }
    assert_eq!(accepted, 1);
}
