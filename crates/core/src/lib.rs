//! Multi-scale Haar cascade detection.
//!
//! A trained [`cascade::domain::cascade_model::CascadeModel`] is rescaled per
//! pyramid level and evaluated at every window position, either on the host
//! ([`detection::infrastructure::sequential_backend`]) or on a wgpu device
//! ([`detection::infrastructure::accelerator_backend`]).

pub mod shared {
    pub mod constants;
    pub mod error;
    pub mod frame;
    pub mod region;
    #[cfg(test)]
    pub mod test_support;
}

pub mod cascade {
    pub mod domain {
        pub mod cascade_model;
        pub mod classifier_evaluator;
        pub mod feature_scaler;
        pub mod haar_feature;
        pub mod integral_image;
    }
}

pub mod detection {
    pub mod domain {
        pub mod detection_parameters;
        pub mod result_set;
        pub mod scale_pyramid;
        pub mod scan_backend;
        pub mod scan_plan;
    }
    pub mod infrastructure;
}

pub mod acceleration {
    pub mod domain {
        pub mod program_cache;
    }
    pub mod infrastructure;
}

pub mod pipeline {
    pub mod detection_session;
    pub mod session_logger;
}
