pub mod cache {
    pub mod cache_config;
    pub mod frame_cache;
}

pub mod codec {
    pub mod domain {
        pub mod io_plugin;
        pub mod plugin_options;
    }
    pub mod infrastructure;
}

pub mod io {
    pub mod file_io;
}

pub mod playback {
    pub mod domain {
        pub mod video_queue;
    }
    pub mod infrastructure {
        pub mod threaded_sequence_reader;
    }
}

pub mod registry {
    pub mod io_factory;
    pub mod option_store;
}

pub mod sequence {
    pub mod domain {
        pub mod file_info;
        pub mod frame_sequence;
        pub mod list_options;
        pub mod recent_files;
    }
    pub mod infrastructure {
        pub mod directory_scanner;
    }
}

pub mod shared {
    pub mod byte_order;
    pub mod constants;
    pub mod convert;
    pub mod image;
    pub mod pixel;
    pub mod settings;
}
