//! Integration tests for the POP3 client.
//!
//! The server side is scripted with `tokio_test::io::Builder`.

#![allow(clippy::unwrap_used)]

use mailprobe_pop3::{Client, Error, ListEntry, Stat};
use tokio_test::io::Builder;

const GREETING: &[u8] = b"+OK POP3 server ready\r\n";

#[tokio::test]
async fn test_login_list_retr_dele_quit() {
    let mock = Builder::new()
        .read(GREETING)
        .write(b"USER inbox\r\n")
        .read(b"+OK\r\n")
        .write(b"PASS secret\r\n")
        .read(b"+OK maildrop locked and ready\r\n")
        .write(b"STAT\r\n")
        .read(b"+OK 2 320\r\n")
        .write(b"LIST\r\n")
        .read(b"+OK 2 messages\r\n1 120\r\n2 200\r\n.\r\n")
        .write(b"RETR 2\r\n")
        .read(b"+OK 200 octets\r\nSubject: T1-abc\r\n\r\n..leading dot\r\nbody\r\n.\r\n")
        .write(b"DELE 2\r\n")
        .read(b"+OK message 2 deleted\r\n")
        .write(b"QUIT\r\n")
        .read(b"+OK bye\r\n")
        .build();

    let client = Client::from_stream(mock).await.unwrap();
    assert_eq!(client.greeting(), "POP3 server ready");

    let mut client = client.login("inbox", "secret").await.unwrap();
    assert_eq!(client.stat().await.unwrap(), Stat { count: 2, size: 320 });
    assert_eq!(
        client.list().await.unwrap(),
        vec![ListEntry { id: 1, size: 120 }, ListEntry { id: 2, size: 200 }]
    );

    let raw = client.retr(2).await.unwrap();
    assert_eq!(raw, b"Subject: T1-abc\r\n\r\n.leading dot\r\nbody\r\n");

    client.dele(2).await.unwrap();
    client.quit().await.unwrap();
}

#[tokio::test]
async fn test_empty_listing() {
    let mock = Builder::new()
        .read(GREETING)
        .write(b"USER inbox\r\n")
        .read(b"+OK\r\n")
        .write(b"PASS secret\r\n")
        .read(b"+OK\r\n")
        .write(b"LIST\r\n")
        .read(b"+OK 0 messages\r\n.\r\n")
        .build();

    let client = Client::from_stream(mock).await.unwrap();
    let mut client = client.login("inbox", "secret").await.unwrap();
    assert!(client.list().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_bad_password() {
    let mock = Builder::new()
        .read(GREETING)
        .write(b"USER inbox\r\n")
        .read(b"+OK\r\n")
        .write(b"PASS wrong\r\n")
        .read(b"-ERR invalid password\r\n")
        .build();

    let client = Client::from_stream(mock).await.unwrap();
    let err = client.login("inbox", "wrong").await.unwrap_err();
    assert!(matches!(err, Error::AuthFailed(ref text) if text == "invalid password"));
}

#[tokio::test]
async fn test_retr_missing_message() {
    let mock = Builder::new()
        .read(GREETING)
        .write(b"USER inbox\r\n")
        .read(b"+OK\r\n")
        .write(b"PASS secret\r\n")
        .read(b"+OK\r\n")
        .write(b"RETR 9\r\n")
        .read(b"-ERR no such message\r\n")
        .build();

    let client = Client::from_stream(mock).await.unwrap();
    let mut client = client.login("inbox", "secret").await.unwrap();
    let err = client.retr(9).await.unwrap_err();
    assert!(matches!(err, Error::Negative(_)));
}

#[tokio::test]
async fn test_negative_greeting() {
    let mock = Builder::new().read(b"-ERR maildrop busy\r\n").build();

    let err = Client::from_stream(mock).await.unwrap_err();
    assert!(matches!(err, Error::Negative(_)));
}

#[tokio::test]
async fn test_connection_closed_during_body() {
    let mock = Builder::new()
        .read(GREETING)
        .write(b"USER inbox\r\n")
        .read(b"+OK\r\n")
        .write(b"PASS secret\r\n")
        .read(b"+OK\r\n")
        .write(b"RETR 1\r\n")
        .read(b"+OK\r\nSubject: cut\r\n")
        .build();

    let client = Client::from_stream(mock).await.unwrap();
    let mut client = client.login("inbox", "secret").await.unwrap();
    let err = client.retr(1).await.unwrap_err();
    assert!(matches!(err, Error::ConnectionClosed));
}

#[tokio::test]
async fn test_oversized_body_is_refused() {
    let mock = Builder::new()
        .read(GREETING)
        .write(b"USER inbox\r\n")
        .read(b"+OK\r\n")
        .write(b"PASS secret\r\n")
        .read(b"+OK\r\n")
        .write(b"RETR 1\r\n")
        .read(b"+OK\r\nSubject: big\r\n\r\n0123456789012345678901234567890123456789\r\n")
        .build();

    let client = Client::from_stream(mock).await.unwrap();
    let mut client = client
        .with_max_response_size(32)
        .login("inbox", "secret")
        .await
        .unwrap();
    let err = client.retr(1).await.unwrap_err();
    assert!(matches!(err, Error::TooLarge(32)));
}

#[tokio::test]
async fn test_body_at_the_cap_is_accepted() {
    let mock = Builder::new()
        .read(GREETING)
        .write(b"USER inbox\r\n")
        .read(b"+OK\r\n")
        .write(b"PASS secret\r\n")
        .read(b"+OK\r\n")
        .write(b"RETR 1\r\n")
        .read(b"+OK\r\nSubject: fits\r\n\r\n.\r\n")
        .build();

    let client = Client::from_stream(mock).await.unwrap();
    let mut client = client
        .with_max_response_size(17)
        .login("inbox", "secret")
        .await
        .unwrap();
    assert_eq!(client.retr(1).await.unwrap(), b"Subject: fits\r\n\r\n");
}
