//! Integration tests for the SMTP client.
//!
//! These tests script the server side with `tokio_test::io::Builder`, which
//! also asserts every byte the client writes.

#![allow(clippy::unwrap_used)]

use mailprobe_smtp::{Address, Client, Error};
use tokio_test::io::Builder;

const GREETING: &[u8] = b"220 mx.hisp-b.example ESMTP ready\r\n";
const EHLO_REPLY: &[u8] = b"250-mx.hisp-b.example\r\n250-DSN\r\n250 AUTH PLAIN LOGIN\r\n";

fn addr(s: &str) -> Address {
    Address::new(s).unwrap()
}

#[tokio::test]
async fn test_full_submission_with_dsn() {
    let mock = Builder::new()
        .read(GREETING)
        .write(b"EHLO client.local\r\n")
        .read(EHLO_REPLY)
        .write(b"AUTH PLAIN AHNlbmRlcgBzZWNyZXQ=\r\n")
        .read(b"235 2.7.0 Authentication successful\r\n")
        .write(b"MAIL FROM:<sender@hisp-a.example>\r\n")
        .read(b"250 OK\r\n")
        .write(b"RCPT TO:<inbox@hisp-b.example> NOTIFY=SUCCESS,FAILURE\r\n")
        .read(b"250 OK\r\n")
        .write(b"DATA\r\n")
        .read(b"354 End data with <CR><LF>.<CR><LF>\r\n")
        .write(b"Subject: T1-abc\r\n\r\n..dot\r\n.\r\n")
        .read(b"250 2.0.0 queued as 1234\r\n")
        .write(b"QUIT\r\n")
        .read(b"221 Bye\r\n")
        .build();

    let client = Client::from_stream(mock).await.unwrap();
    assert_eq!(client.server_info().hostname, "mx.hisp-b.example");

    let client = client.ehlo("client.local").await.unwrap();
    assert!(client.server_info().supports_dsn());

    let client = client.auth_plain("sender", "secret").await.unwrap();
    let client = client.mail_from(&addr("sender@hisp-a.example")).await.unwrap();
    let (client, refused) = client
        .recipients(&[addr("inbox@hisp-b.example")], Some("SUCCESS,FAILURE"))
        .await
        .unwrap();
    assert!(refused.is_empty());

    let client = client.data().await.unwrap();
    let client = client
        .send_message(b"Subject: T1-abc\n\n.dot\n")
        .await
        .unwrap();
    client.quit().await.unwrap();
}

#[tokio::test]
async fn test_notify_omitted_without_dsn() {
    let mock = Builder::new()
        .read(GREETING)
        .write(b"EHLO client.local\r\n")
        .read(b"250 mx.hisp-b.example\r\n")
        .write(b"MAIL FROM:<sender@hisp-a.example>\r\n")
        .read(b"250 OK\r\n")
        .write(b"RCPT TO:<inbox@hisp-b.example>\r\n")
        .read(b"250 OK\r\n")
        .build();

    let client = Client::from_stream(mock).await.unwrap();
    let client = client.ehlo("client.local").await.unwrap();
    let client = client.mail_from(&addr("sender@hisp-a.example")).await.unwrap();
    let (_client, refused) = client
        .recipients(&[addr("inbox@hisp-b.example")], Some("SUCCESS,FAILURE"))
        .await
        .unwrap();
    assert!(refused.is_empty());
}

#[tokio::test]
async fn test_partial_recipient_refusal() {
    let mock = Builder::new()
        .read(GREETING)
        .write(b"MAIL FROM:<sender@hisp-a.example>\r\n")
        .read(b"250 OK\r\n")
        .write(b"RCPT TO:<ghost@hisp-b.example>\r\n")
        .read(b"550 5.1.1 No such user\r\n")
        .write(b"RCPT TO:<inbox@hisp-b.example>\r\n")
        .read(b"250 OK\r\n")
        .build();

    let client = Client::from_stream(mock).await.unwrap();
    let client = client.mail_from(&addr("sender@hisp-a.example")).await.unwrap();
    let (_client, refused) = client
        .recipients(
            &[addr("ghost@hisp-b.example"), addr("inbox@hisp-b.example")],
            None,
        )
        .await
        .unwrap();

    assert_eq!(refused.len(), 1);
    assert_eq!(refused[0].address.as_str(), "ghost@hisp-b.example");
    assert_eq!(refused[0].code, 550);
    assert_eq!(refused[0].message, "5.1.1 No such user");
}

#[tokio::test]
async fn test_all_recipients_refused() {
    let mock = Builder::new()
        .read(GREETING)
        .write(b"MAIL FROM:<sender@hisp-a.example>\r\n")
        .read(b"250 OK\r\n")
        .write(b"RCPT TO:<ghost@hisp-b.example>\r\n")
        .read(b"550 No such user\r\n")
        .build();

    let client = Client::from_stream(mock).await.unwrap();
    let client = client.mail_from(&addr("sender@hisp-a.example")).await.unwrap();
    let err = client
        .recipients(&[addr("ghost@hisp-b.example")], None)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        Error::AllRecipientsRefused(ref list) if list.contains("ghost@hisp-b.example (550)")
    ));
}

#[tokio::test]
async fn test_auth_login_rejected() {
    let mock = Builder::new()
        .read(GREETING)
        .write(b"AUTH LOGIN\r\n")
        .read(b"334 VXNlcm5hbWU6\r\n")
        .write(b"c2VuZGVy\r\n")
        .read(b"334 UGFzc3dvcmQ6\r\n")
        .write(b"d3Jvbmc=\r\n")
        .read(b"535 5.7.8 Authentication credentials invalid\r\n")
        .build();

    let client = Client::from_stream(mock).await.unwrap();
    let err = client.auth_login("sender", "wrong").await.unwrap_err();

    assert!(matches!(err, Error::AuthFailed { code: 535, .. }));
}

#[tokio::test]
async fn test_greeting_rejected() {
    let mock = Builder::new()
        .read(b"554 No SMTP service here\r\n")
        .build();

    let err = Client::from_stream(mock).await.unwrap_err();
    assert!(matches!(err, Error::SmtpError { code: 554, .. }));
}

#[tokio::test]
async fn test_connection_closed_mid_reply() {
    let mock = Builder::new().read(b"220-first line\r\n").build();

    let err = Client::from_stream(mock).await.unwrap_err();
    assert!(matches!(err, Error::ConnectionClosed));
}

#[tokio::test]
async fn test_message_rejected_after_data() {
    let mock = Builder::new()
        .read(GREETING)
        .write(b"MAIL FROM:<sender@hisp-a.example>\r\n")
        .read(b"250 OK\r\n")
        .write(b"RCPT TO:<inbox@hisp-b.example>\r\n")
        .read(b"250 OK\r\n")
        .write(b"DATA\r\n")
        .read(b"354 go ahead\r\n")
        .write(b"hello\r\n.\r\n")
        .read(b"554 5.7.1 Message rejected as spam\r\n")
        .build();

    let client = Client::from_stream(mock).await.unwrap();
    let client = client.mail_from(&addr("sender@hisp-a.example")).await.unwrap();
    let (client, _) = client
        .recipients(&[addr("inbox@hisp-b.example")], None)
        .await
        .unwrap();
    let client = client.data().await.unwrap();
    let err = client.send_message(b"hello").await.unwrap_err();

    assert!(matches!(err, Error::SmtpError { code: 554, .. }));
}
