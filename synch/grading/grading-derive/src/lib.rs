use proc_macro::TokenStream;
use quote::{quote, quote_spanned};
use syn::{ItemFn, LitInt, parse_macro_input, spanned::Spanned};

/// Runs the test body as the main thread of a fresh simulated machine.
///
/// The optional argument is the priority of the main thread; it defaults to
/// `Priority::DEFAULT`.
#[proc_macro_attribute]
pub fn kernel_test(attr: TokenStream, item: TokenStream) -> TokenStream {
    let priority: proc_macro2::TokenStream = if attr.is_empty() {
        quote! { ::synch::thread::Priority::DEFAULT }
    } else {
        let value = parse_macro_input!(attr as LitInt);
        quote! { ::synch::thread::Priority::new(#value) }
    };
    let mut input_fn = parse_macro_input!(item as ItemFn);
    let block = *input_fn.block;
    *input_fn.block = syn::parse_quote! {
        {
            ::grading::Machine::builder()
                .main_priority(#priority)
                .run(move || #block);
        }
    };
    TokenStream::from(quote_spanned! { input_fn.span() =>
        #[test]
        #input_fn
    })
}

/// Checks, after the test body, that no thread keeps a donation record or a
/// waiting edge.
///
/// Must be placed above `#[kernel_test]`.
#[proc_macro_attribute]
pub fn validate_donations(_attr: TokenStream, item: TokenStream) -> TokenStream {
    let mut input_fn = parse_macro_input!(item as ItemFn);
    let block = *input_fn.block;
    *input_fn.block = syn::parse_quote! {
        {
            let _return_val = (move || { #block })();
            ::grading::validate_donations();
            _return_val
        }
    };
    TokenStream::from(quote_spanned! { input_fn.span() =>
        #input_fn
    })
}
