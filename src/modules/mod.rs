pub mod emotion_client;
