//! Prints the `GslbConfig` CustomResourceDefinition manifest, for piping into
//! `kubectl apply -f -` when installing the controller.

use kube::CustomResourceExt;
use simple_gslb::crd::GslbConfig;

fn main() {
    print!("{}", serde_yaml::to_string(&GslbConfig::crd()).unwrap());
}
