//! Integration tests for the MinIO (S3) fixture.

#![cfg(feature = "minio")]

use dockertestx::minio::{prep_bucket, prep_s3_objects, run_minio, upload_object};
use dockertestx::unique_id;
use std::collections::HashMap;

#[tokio::test]
async fn test_minio_prep_objects() {
    match run_minio().await {
        Ok(fixture) => {
            let bucket = unique_id("fixtures");
            let objects = HashMap::from([
                ("a.txt".to_string(), b"alpha".to_vec()),
                ("nested/b.json".to_string(), br#"{"b":1}"#.to_vec()),
            ]);
            prep_s3_objects(&fixture, &bucket, &objects)
                .await
                .expect("Failed to prep objects");

            let listed = fixture
                .list_objects_v2()
                .bucket(&bucket)
                .send()
                .await
                .expect("Failed to list objects");
            let mut keys: Vec<&str> = listed.contents().iter().filter_map(|o| o.key()).collect();
            keys.sort_unstable();
            assert_eq!(keys, vec!["a.txt", "nested/b.json"]);

            let object = fixture
                .get_object()
                .bucket(&bucket)
                .key("a.txt")
                .send()
                .await
                .expect("Failed to get object");
            let body = object.body.collect().await.unwrap().into_bytes();
            assert_eq!(body.as_ref(), b"alpha");

            fixture.cleanup().await;
        }
        Err(e) => {
            eprintln!("Skipping MinIO test: Docker not available ({})", e);
        }
    }
}

#[tokio::test]
async fn test_minio_prep_bucket_is_idempotent() {
    match run_minio().await {
        Ok(fixture) => {
            let bucket = unique_id("idempotent");
            prep_bucket(&fixture, &bucket).await.expect("First create");
            prep_bucket(&fixture, &bucket).await.expect("Second create");

            upload_object(&fixture, &bucket, "k", "v")
                .await
                .expect("Failed to upload");

            fixture.cleanup().await;
        }
        Err(e) => {
            eprintln!("Skipping MinIO test: Docker not available ({})", e);
        }
    }
}
