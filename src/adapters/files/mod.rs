pub mod video_library;
