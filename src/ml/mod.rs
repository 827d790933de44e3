pub mod model;
pub mod predictor;
pub mod shap;
