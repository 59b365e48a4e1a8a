use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use tokio_postgres::{Client, Config, NoTls, SimpleQueryMessage};
use ulid::Ulid;

struct Target {
    host: String,
    port: u16,
    user: String,
    password: String,
}

async fn connect(target: &Target) -> Client {
    let mut config = Config::new();
    config
        .host(&target.host)
        .port(target.port)
        .dbname("hotelpark")
        .user(&target.user)
        .password(&target.password);

    let (client, conn) = config.connect(NoTls).await.expect("connect failed");
    tokio::spawn(async move {
        if let Err(e) = conn.await {
            eprintln!("connection error: {e}");
        }
    });
    client
}

fn percentile(sorted: &[Duration], p: f64) -> Duration {
    if sorted.is_empty() {
        return Duration::ZERO;
    }
    let idx = ((sorted.len() as f64) * p / 100.0) as usize;
    sorted[idx.min(sorted.len() - 1)]
}

fn print_latency(label: &str, latencies: &mut [Duration]) {
    if latencies.is_empty() {
        println!("  {label}: no samples");
        return;
    }
    latencies.sort();
    let total: Duration = latencies.iter().sum();
    let avg = total / latencies.len() as u32;
    println!("  {label}:");
    println!(
        "    n={}, avg={:.2}ms, p50={:.2}ms, p95={:.2}ms, p99={:.2}ms, max={:.2}ms",
        latencies.len(),
        avg.as_secs_f64() * 1000.0,
        percentile(latencies, 50.0).as_secs_f64() * 1000.0,
        percentile(latencies, 95.0).as_secs_f64() * 1000.0,
        percentile(latencies, 99.0).as_secs_f64() * 1000.0,
        latencies[latencies.len() - 1].as_secs_f64() * 1000.0,
    );
}

async fn returning_id(client: &Client, sql: &str) -> i64 {
    let messages = client.simple_query(sql).await.unwrap();
    messages
        .iter()
        .find_map(|m| match m {
            SimpleQueryMessage::Row(row) => row.get("id").and_then(|v| v.parse().ok()),
            _ => None,
        })
        .expect("RETURNING row")
}

async fn available(client: &Client, garage: i64) -> i64 {
    let messages = client
        .simple_query(&format!("SELECT available FROM garage_spaces WHERE garage_id = {garage}"))
        .await
        .unwrap();
    messages
        .iter()
        .find_map(|m| match m {
            SimpleQueryMessage::Row(row) => row.get("available").and_then(|v| v.parse().ok()),
            _ => None,
        })
        .expect("garage_spaces row")
}

/// A fresh city → hotel → garage chain. Returns the garage id.
async fn garage(client: &Client, capacity: i64) -> i64 {
    let city = returning_id(
        client,
        "INSERT INTO cities (name, population) VALUES ('Bench City', 50000) RETURNING *",
    )
    .await;
    let hotel = returning_id(
        client,
        &format!("INSERT INTO hotels (city_id, name, stars) VALUES ({city}, 'Bench Hotel', 3) RETURNING *"),
    )
    .await;
    returning_id(
        client,
        &format!("INSERT INTO garages (hotel_id, name, capacity) VALUES ({hotel}, 'Bench Garage', {capacity}) RETURNING *"),
    )
    .await
}

/// Plates carry the random half of a ULID so reruns against a persistent
/// server never collide.
fn park_sql(garage: i64) -> String {
    let ulid = Ulid::new().to_string();
    format!(
        "INSERT INTO cars (garage_id, brand, license_plate, owner_name) VALUES ({garage}, 'Volvo', 'B-{}', 'bench')",
        &ulid[10..]
    )
}

async fn phase1_sequential(target: &Target) {
    let client = connect(target).await;
    let n = 2000;
    let garage = garage(&client, n).await;

    let mut latencies = Vec::with_capacity(n as usize);
    let start = Instant::now();
    for _ in 0..n {
        let t = Instant::now();
        client.batch_execute(&park_sql(garage)).await.unwrap();
        latencies.push(t.elapsed());
    }

    let elapsed = start.elapsed();
    let ops = n as f64 / elapsed.as_secs_f64();
    println!("  {n} cars parked in {:.2}s = {ops:.0} ops/sec", elapsed.as_secs_f64());
    print_latency("park latency", &mut latencies);
    client
        .batch_execute(&format!("DELETE FROM garages WHERE id = {garage}"))
        .await
        .unwrap();
}

/// Many connections race for the last spaces of one garage. Exactly `capacity`
/// of them may win.
async fn phase2_contention(target: &Target) {
    let capacity = 25;
    let n_tasks = 20;
    let n_per_task = 10;

    let setup = connect(target).await;
    let garage = garage(&setup, capacity).await;

    let admitted = Arc::new(AtomicUsize::new(0));
    let rejected = Arc::new(AtomicUsize::new(0));
    let start = Instant::now();
    let mut handles = Vec::new();
    for _ in 0..n_tasks {
        let client = connect(target).await;
        let admitted = admitted.clone();
        let rejected = rejected.clone();
        handles.push(tokio::spawn(async move {
            for _ in 0..n_per_task {
                match client.batch_execute(&park_sql(garage)).await {
                    Ok(()) => admitted.fetch_add(1, Ordering::Relaxed),
                    Err(_) => rejected.fetch_add(1, Ordering::Relaxed),
                };
            }
        }));
    }
    for h in handles {
        h.await.unwrap();
    }

    let elapsed = start.elapsed();
    let admitted = admitted.load(Ordering::Relaxed);
    let rejected = rejected.load(Ordering::Relaxed);
    println!(
        "  {n_tasks} tasks x {n_per_task} attempts on capacity {capacity}: {admitted} admitted, {rejected} rejected in {:.2}s",
        elapsed.as_secs_f64()
    );
    assert_eq!(admitted, capacity as usize, "garage admitted more cars than its capacity");
    assert_eq!(available(&setup, garage).await, 0);
    setup
        .batch_execute(&format!("DELETE FROM garages WHERE id = {garage}"))
        .await
        .unwrap();
}

async fn phase3_read_under_load(target: &Target) {
    let setup = connect(target).await;
    let read_garage = garage(&setup, 100).await;
    for _ in 0..50 {
        setup.batch_execute(&park_sql(read_garage)).await.unwrap();
    }

    let stop = Arc::new(AtomicBool::new(false));
    let mut writer_handles = Vec::new();
    for _ in 0..5 {
        let client = connect(target).await;
        let write_garage = garage(&client, 100_000).await;
        let stop = stop.clone();
        writer_handles.push(tokio::spawn(async move {
            while !stop.load(Ordering::Relaxed) {
                let _ = client.batch_execute(&park_sql(write_garage)).await;
            }
            write_garage
        }));
    }

    let n_readers = 10;
    let reads_per_reader = 500;
    let mut reader_handles = Vec::new();
    for _ in 0..n_readers {
        let client = connect(target).await;
        reader_handles.push(tokio::spawn(async move {
            let mut latencies = Vec::with_capacity(reads_per_reader);
            for _ in 0..reads_per_reader {
                let t = Instant::now();
                client
                    .batch_execute(&format!("SELECT * FROM cars WHERE garage_id = {read_garage}"))
                    .await
                    .unwrap();
                latencies.push(t.elapsed());
            }
            latencies
        }));
    }

    let mut all_latencies = Vec::new();
    for h in reader_handles {
        all_latencies.extend(h.await.unwrap());
    }

    stop.store(true, Ordering::Relaxed);
    for h in writer_handles {
        if let Ok(write_garage) = h.await {
            let _ = setup
                .batch_execute(&format!("DELETE FROM garages WHERE id = {write_garage}"))
                .await;
        }
    }
    setup
        .batch_execute(&format!("DELETE FROM garages WHERE id = {read_garage}"))
        .await
        .unwrap();

    print_latency("car listing", &mut all_latencies);
}

async fn phase4_connection_storm(target: Arc<Target>) {
    let n_conns = 50;
    let ops_per_conn = 10;

    let start = Instant::now();
    let success = Arc::new(AtomicUsize::new(0));
    let mut handles = Vec::new();
    for _ in 0..n_conns {
        let target = target.clone();
        let success = success.clone();
        handles.push(tokio::spawn(async move {
            let client = connect(&target).await;
            let garage = garage(&client, ops_per_conn).await;
            for _ in 0..ops_per_conn {
                client.batch_execute(&park_sql(garage)).await.unwrap();
            }
            client
                .batch_execute(&format!("DELETE FROM garages WHERE id = {garage}"))
                .await
                .unwrap();
            success.fetch_add(1, Ordering::Relaxed);
        }));
    }
    for h in handles {
        let _ = h.await;
    }

    let elapsed = start.elapsed();
    let ok = success.load(Ordering::Relaxed);
    println!(
        "  {n_conns} connections, {ops_per_conn} cars each: {ok}/{n_conns} succeeded in {:.2}s",
        elapsed.as_secs_f64()
    );
}

#[tokio::main]
async fn main() {
    let target = Target {
        host: std::env::var("HOTELPARK_HOST").unwrap_or_else(|_| "127.0.0.1".into()),
        port: std::env::var("HOTELPARK_PORT")
            .unwrap_or_else(|_| "5434".into())
            .parse()
            .expect("invalid HOTELPARK_PORT"),
        user: std::env::var("HOTELPARK_USER").unwrap_or_else(|_| "hotelpark".into()),
        password: std::env::var("HOTELPARK_PASSWORD").unwrap_or_else(|_| "hotelpark".into()),
    };

    println!("=== hotelpark stress benchmark ===");
    println!("target: {}:{}\n", target.host, target.port);

    println!("[phase 1] sequential parking throughput");
    phase1_sequential(&target).await;

    println!("\n[phase 2] concurrent admission on one garage");
    phase2_contention(&target).await;

    println!("\n[phase 3] read latency under write load");
    phase3_read_under_load(&target).await;

    println!("\n[phase 4] connection storm");
    phase4_connection_storm(Arc::new(target)).await;

    println!("\n=== benchmark complete ===");
}
